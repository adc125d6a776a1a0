use serde::{Deserialize, Serialize};

/// Number of candidate scripts the backend produces per generation request.
/// The consumer renders them as version slots A, B and C.
pub const VERSION_SLOTS: usize = 3;

/// One scene of a generated animation script.
///
/// Field names match the backend wire format. Everything is optional on the
/// wire; missing fields fall back to zero values rather than failing the
/// whole event.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scene {
    /// 1-based position of the scene within its script.
    pub seq: u32,
    /// Narration / on-screen text for the scene.
    pub text: String,
    /// Name of the animation template the renderer should use.
    pub anim: String,
    /// How long the scene plays, in seconds.
    pub duration_sec: f64,
}

/// A complete generated script: a titled, ordered list of scenes.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Script {
    pub title: String,
    pub scenes: Vec<Scene>,
}

impl Script {
    /// Order scenes by `seq` ascending. The backend does not guarantee
    /// arrival order inside a payload, display always does.
    pub fn sort_scenes(&mut self) {
        self.scenes.sort_by_key(|scene| scene.seq);
    }

    /// The unpopulated-slot stand-in: an untitled script with two blank
    /// scenes, matching what an empty editor form shows.
    pub fn placeholder() -> Self {
        Self {
            title: String::new(),
            scenes: vec![
                Scene {
                    seq: 1,
                    ..Scene::default()
                },
                Scene {
                    seq: 2,
                    ..Scene::default()
                },
            ],
        }
    }

    /// Text of the first scene in display order, if any.
    pub fn first_scene_text(&self) -> Option<&str> {
        self.scenes
            .iter()
            .min_by_key(|scene| scene.seq)
            .map(|scene| scene.text.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
