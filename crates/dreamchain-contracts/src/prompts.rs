//! Prompt templates for the generate -> describe -> generate cycle.
//!
//! The first image of a run renders the user's prompt in the chosen style.
//! Every later image wraps the previous description in the next-frame
//! template, so each frame reads as a continuation of the same scene.

pub const INITIAL_IMAGE_TEMPLATE: &str = "a movie-scene rendering of {prompt} in the style of {style}";

pub const NEXT_FRAME_TEMPLATE: &str =
    "the next frame of the same movie scene, continuing from this description: {description}";

pub const DEFAULT_DESCRIPTION_TEMPLATE: &str =
    "Describe this image in 3 epic paragraphs, with an absurd twist in the last paragraph.";

pub const PROMPT_LIBRARY: [&str; 5] = [
    "A futuristic cityscape at sunset",
    "A wise old tree stump wizard",
    "A robot painting a self-portrait",
    "A surreal underwater library",
    "A dragon reading a book to children",
];

pub fn initial_image_prompt(prompt: &str, style: &str) -> String {
    let prompt = prompt.trim();
    let style = style.trim();
    if style.is_empty() {
        // No style: drop the trailing clause rather than render "in the style of ".
        return format!("a movie-scene rendering of {prompt}");
    }
    format!("a movie-scene rendering of {prompt} in the style of {style}")
}

pub fn next_frame_prompt(description: &str) -> String {
    format!(
        "the next frame of the same movie scene, continuing from this description: {}",
        description.trim()
    )
}

/// One-based lookup into [`PROMPT_LIBRARY`].
pub fn library_prompt(number: usize) -> Option<&'static str> {
    number
        .checked_sub(1)
        .and_then(|idx| PROMPT_LIBRARY.get(idx).copied())
}

/// Human-readable overview of the three steps, in cycle order.
pub fn loop_steps(description_template: &str) -> [(&'static str, String); 3] {
    [
        ("image", INITIAL_IMAGE_TEMPLATE.to_string()),
        ("description", description_template.to_string()),
        ("next image", NEXT_FRAME_TEMPLATE.to_string()),
    ]
}
