//! Classifiers wrapped around the opaque inference backends.
//!
//! - `sound`: windowed sound classification (frames → averaged scores → label)
//! - `presence`: snapshot → pet presence via probability threshold
//! - `emotion`: sound label or embedding → emotion

pub mod emotion;
pub mod presence;
pub mod sound;

pub use emotion::{
    emotion_from_embedding, emotion_from_sound, resolve_emotion, summarize, EmbeddingSummary,
    EmotionLabel, EmotionPolicy,
};
pub use presence::{
    load_image, PresenceClassifier, PresenceDecision, DEFAULT_PRESENCE_THRESHOLD,
    PRESENCE_INPUT_HEIGHT, PRESENCE_INPUT_WIDTH,
};
pub use sound::{
    argmax, SoundClassification, SoundClassifier, SoundLabel, DEFAULT_FRAME_SIZE, SOUND_CLASSES,
};
