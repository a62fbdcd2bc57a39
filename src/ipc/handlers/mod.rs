pub mod attendance;
pub mod core;
pub mod periods;
pub mod registry;
pub mod stats;
pub mod timetable;
