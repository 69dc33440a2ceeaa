// src/ring/mod.rs
pub mod frame_ring;

pub use frame_ring::FrameRing;
pub use frame_ring::PushOutcome;
