// Services module — date logic and day state, independent of storage
pub mod daily;
pub mod intake;
pub mod medication;
pub mod recurrence;
pub mod schedule;
