// ABOUTME: Shared configuration constants for the dockbox workspace
// ABOUTME: Re-exports environment variable names and default filesystem locations

pub mod constants;
