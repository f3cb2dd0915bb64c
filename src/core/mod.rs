pub mod artifact;
pub mod blocks;
pub mod channels;
pub mod snapshot;
