pub mod actions;
pub mod connectivity;
pub mod events;
pub mod sync;
