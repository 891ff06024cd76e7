use clap::Parser;

/// Install an OS image onto this machine's target disk as described by the template named in
/// /etc/ister.conf.
#[derive(Debug, Parser)]
#[command(name = "ister", author, version, about = "ister OS installer")]
pub struct Cli {}
