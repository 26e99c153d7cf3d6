/// Static presets selectable before rendering. These are client-side
/// catalogs; the backend only receives the chosen id/name.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Voice {
    pub id: u32,
    pub name: &'static str,
    pub style: &'static str,
}

pub const DEFAULT_VOICE_ID: u32 = 1;

pub fn voices() -> &'static [Voice] {
    &[
        Voice {
            id: 1,
            name: "Daniel",
            style: "Male - Professional",
        },
        Voice {
            id: 2,
            name: "Emma",
            style: "Female - Energetic",
        },
        Voice {
            id: 3,
            name: "James",
            style: "Male - Calm",
        },
        Voice {
            id: 4,
            name: "Sophia",
            style: "Female - Professional",
        },
    ]
}

pub const DEFAULT_MUSIC_TRACK: &str = "Energetic Pop";

pub fn music_tracks() -> &'static [&'static str] {
    &[
        "Energetic Pop",
        "Chill Lofi",
        "Corporate Uplifting",
        "Cinematic Epic",
    ]
}
