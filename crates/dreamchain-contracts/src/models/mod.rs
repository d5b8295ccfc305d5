mod registry;

pub use registry::{ModelRegistry, ModelSpec, IMAGE_CAPABILITY, VISION_CAPABILITY};
