pub mod controller;
pub mod fanout;
pub mod session;
