// CLI module
//
// - arguments: command line parsing and dispatch of the subcommands

pub mod arguments;

pub use arguments::HostedArguments;
