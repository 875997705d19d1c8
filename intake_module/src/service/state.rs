use crate::worker::BatchQueue;

#[derive(Clone)]
pub struct IntakeState {
    pub queue: BatchQueue,
    pub channel_secret: Option<String>,
}
