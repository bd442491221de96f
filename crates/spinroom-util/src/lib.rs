pub mod clock;
pub mod id;
pub mod room_code;
