pub mod intake;

pub use intake::{InquiryIntake, IntakeError};
