//! Top-level device loop: one capture, send, dispatch turn per user trigger.

mod orchestrator;

#[cfg(test)]
mod tests;

pub use orchestrator::DeviceOrchestrator;
