pub mod challenge;
pub mod events;
pub mod feedback;
pub mod history;
pub mod modes;
