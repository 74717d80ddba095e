pub mod bus;
pub mod caps;
pub mod chunk;
pub mod clock;
pub mod config;
pub mod controller;
pub mod device;
pub mod gate;
pub mod main_loop;
pub mod pipeline;
pub mod playback;
pub mod producer;
pub mod queue;
pub mod resample;
pub mod scheduler;
pub mod session;
pub mod sink;
pub mod source;
pub mod status;

#[cfg(test)]
mod testing;
