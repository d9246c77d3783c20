mod client;

pub use client::{SignalClient, SignalCode};

#[cfg(test)]
mod tests;
