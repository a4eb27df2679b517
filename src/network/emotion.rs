use std::fmt;

/// The emotion classes the classifier distinguishes. A label is the
/// variant's index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emotion {
    Happy,
    Sad,
    Surprise,
}

impl Emotion {
    pub const ALL: [Emotion; 3] = [Emotion::Happy, Emotion::Sad, Emotion::Surprise];

    pub fn from_label(label: usize) -> Option<Emotion> {
        Emotion::ALL.get(label).copied()
    }

    pub fn label(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Surprise => "surprise",
        };
        f.write_str(name)
    }
}
