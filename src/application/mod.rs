pub mod bootstrap;
pub mod selection_controller;
