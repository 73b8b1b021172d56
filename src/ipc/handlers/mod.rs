pub mod classes;
pub mod core;
pub mod distribute;
pub mod settings;
pub mod students;
