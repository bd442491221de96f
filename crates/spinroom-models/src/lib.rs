pub mod control;
pub mod deck;
pub mod member;
pub mod mixer;
pub mod protocol;
pub mod queue;
pub mod room;
