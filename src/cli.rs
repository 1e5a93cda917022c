use clap::{value_parser, Arg, ArgAction, Command};

fn id_arg(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name).required(true).help(help)
}

fn reason_arg() -> Arg {
    Arg::new("reason")
        .long("reason")
        .num_args(1)
        .help("Audit log reason attached to the request")
}

pub fn build_cli() -> Command {
    Command::new("discord-rest")
        .about("Run single Discord REST operations through the rate-limited client")
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .num_args(1)
                .global(true)
                .help("Override RUST_LOG level (e.g., info, debug)"),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .num_args(1)
                .global(true)
                .value_parser(value_parser!(u64))
                .help("Abort the operation after this many seconds"),
        )
        .arg(
            Arg::new("version")
                .long("version")
                .help("Print version and exit")
                .action(ArgAction::SetTrue),
        )
        .subcommand(Command::new("me").about("Get the current bot user"))
        .subcommand(
            Command::new("guild")
                .about("Get a guild")
                .arg(id_arg("guild_id", "Guild id")),
        )
        .subcommand(
            Command::new("channel")
                .about("Get one or more channels concurrently")
                .arg(
                    Arg::new("channel_id")
                        .required(true)
                        .num_args(1..)
                        .help("Channel ids"),
                ),
        )
        .subcommand(
            Command::new("roles")
                .about("List the roles of a guild")
                .arg(id_arg("guild_id", "Guild id")),
        )
        .subcommand(
            Command::new("delete-message")
                .about("Delete a message")
                .arg(id_arg("channel_id", "Channel id"))
                .arg(id_arg("message_id", "Message id"))
                .arg(reason_arg()),
        )
        .subcommand(
            Command::new("request")
                .about("Send a raw request, e.g. `request GET /guilds/123/emojis`")
                .arg(Arg::new("method").required(true).help("HTTP method"))
                .arg(Arg::new("path").required(true).help("Path below the API root"))
                .arg(
                    Arg::new("data")
                        .long("data")
                        .num_args(1)
                        .help("JSON request body"),
                )
                .arg(reason_arg()),
        )
}

pub fn init_logging(level: Option<&str>) {
    // Explicit level wins, then RUST_LOG, then warn so stdout stays JSON-only.
    let env = env_logger::Env::default().default_filter_or(level.unwrap_or("warn"));
    let mut builder = env_logger::Builder::from_env(env);
    if let Some(lvl) = level {
        builder.parse_filters(lvl);
    }
    builder.target(env_logger::Target::Stderr).init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn channel_accepts_many_ids() {
        let m = build_cli()
            .try_get_matches_from(["discord-rest", "channel", "1", "2", "3"])
            .unwrap();
        let (_, sub) = m.subcommand().unwrap();
        assert_eq!(sub.get_many::<String>("channel_id").unwrap().count(), 3);
    }
}
