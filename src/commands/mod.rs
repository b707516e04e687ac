pub mod characters;
pub mod matching;
pub mod roles;
pub mod settings;
pub mod tags;
