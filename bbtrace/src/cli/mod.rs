pub mod args;

pub use args::{Args, BufferArgs, Command, CounterArgs, Format, StoreArgs};
