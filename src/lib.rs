#![doc = include_str!("../README.md")]
pub mod command_buffer;
pub mod configuration;
pub mod controller;
pub mod interfaces;
pub mod kinematics;
pub mod odometry;
pub mod speed_limiter;
