pub mod accumulation;
pub mod binding_slots;
pub mod constants;
pub mod frame_counter;
pub mod scene;
pub mod settings;
pub mod view;
