// ABOUTME: Subcommand handlers for the dockbox binary
// ABOUTME: Grouped by whether they change the sandbox, act inside it or only inspect

pub mod inspect;
pub mod lifecycle;
pub mod remote;
