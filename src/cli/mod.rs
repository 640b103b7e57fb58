mod commands;
#[cfg(test)]
mod tests;

pub use commands::{run, serve, Cli};
