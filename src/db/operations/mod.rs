pub mod exercises;
pub mod topics;
pub mod users;
pub mod views;

pub use exercises::{Exercise, ExercisePayload};
pub use topics::{PromptVersion, Topic};
pub use users::{User, UserStats};
pub use views::UserExerciseView;
