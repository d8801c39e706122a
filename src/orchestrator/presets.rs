// Style presets appended to prompts
// Author: kelexine (https://github.com/kelexine)

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StylePreset {
    pub id: &'static str,
    pub label: &'static str,
    pub modifier: &'static str,
}

pub const STYLE_PRESETS: &[StylePreset] = &[
    StylePreset {
        id: "none",
        label: "None",
        modifier: "",
    },
    StylePreset {
        id: "cinematic",
        label: "Cinematic",
        modifier: "cinematic lighting, 8k, highly detailed, film grain, masterpiece",
    },
    StylePreset {
        id: "ghibli",
        label: "Studio Ghibli",
        modifier: "studio ghibli style, hand-drawn, whimsical, lush landscapes, anime aesthetic",
    },
    StylePreset {
        id: "cyberpunk",
        label: "Cyberpunk",
        modifier: "cyberpunk aesthetic, neon lighting, rainy streets, futuristic, high contrast",
    },
    StylePreset {
        id: "synthwave",
        label: "80s Synthwave",
        modifier: "80s synthwave style, retro-futuristic, neon pink and purple, grid background",
    },
    StylePreset {
        id: "minimalist",
        label: "Minimalist",
        modifier: "minimalist digital art, clean lines, simple composition, flat colors",
    },
    StylePreset {
        id: "oil",
        label: "Oil Painting",
        modifier: "textured oil painting, thick brushstrokes, classical art style, rich colors",
    },
];

pub fn find_preset(id: &str) -> Option<&'static StylePreset> {
    STYLE_PRESETS.iter().find(|p| p.id.eq_ignore_ascii_case(id))
}

impl StylePreset {
    /// `"{prompt}, {modifier}"`, or the prompt untouched for an empty modifier.
    pub fn apply(&self, prompt: &str) -> String {
        if self.modifier.is_empty() {
            prompt.to_string()
        } else {
            format!("{}, {}", prompt, self.modifier)
        }
    }
}
