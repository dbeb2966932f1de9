mod call;

pub use call::{CallDocument, CallParticipantDocument, ParticipantStatusDocument};
