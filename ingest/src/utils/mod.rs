pub mod arrow;
pub mod retry;
pub mod time;
