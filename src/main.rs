mod cli;

use discord_rest::{Client, Config, Context, Error, Request, Route, Snowflake};
use futures::future::join_all;
use reqwest::Method;
use serde_json::Value;
use std::process::ExitCode;
use std::time::Duration;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    let matches = cli::build_cli().get_matches();
    let log_level = matches.get_one::<String>("log-level").cloned();
    cli::init_logging(log_level.as_deref());

    if matches.get_flag("version") {
        println!("discord-rest {}", env!("CARGO_PKG_VERSION"));
        return Ok(ExitCode::SUCCESS);
    }
    let Some((name, args)) = matches.subcommand() else {
        cli::build_cli().print_help()?;
        return Ok(ExitCode::from(2));
    };

    let cfg = Config::from_env().map_err(anyhow::Error::msg)?;
    let client = Client::new(cfg)?;
    let ctx = match matches.get_one::<u64>("timeout") {
        Some(secs) => Context::background().with_timeout(Duration::from_secs(*secs)),
        None => Context::background(),
    };

    match run(&client, &ctx, name, args).await {
        Ok(value) => {
            println!("{}", serde_json::to_string(&value)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            log::warn!("{} failed: {}", name, err);
            println!("{}", serde_json::json!({ "error": err.info() }));
            Ok(ExitCode::FAILURE)
        }
    }
}

fn id(args: &clap::ArgMatches, name: &str) -> Result<Snowflake, Error> {
    let raw = args.get_one::<String>(name).map(String::as_str).unwrap_or_default();
    Ok(Snowflake::parse(raw)?)
}

async fn run(
    client: &Client,
    ctx: &Context,
    name: &str,
    args: &clap::ArgMatches,
) -> Result<Value, Error> {
    let value = match name {
        "me" => serde_json::to_value(client.get_current_user(ctx).await?)?,
        "guild" => serde_json::to_value(client.get_guild(ctx, id(args, "guild_id")?).await?)?,
        "roles" => {
            serde_json::to_value(client.get_guild_roles(ctx, id(args, "guild_id")?).await?)?
        }
        "channel" => {
            let ids = args
                .get_many::<String>("channel_id")
                .into_iter()
                .flatten()
                .map(|s| Snowflake::parse(s))
                .collect::<Result<Vec<_>, _>>()?;
            let channels = join_all(ids.into_iter().map(|id| client.get_channel(ctx, id)))
                .await
                .into_iter()
                .collect::<Result<Vec<_>, _>>()?;
            serde_json::to_value(channels)?
        }
        "delete-message" => {
            let channel_id = id(args, "channel_id")?;
            let message_id = id(args, "message_id")?;
            match args.get_one::<String>("reason") {
                Some(reason) => {
                    let route = Route::new(
                        Method::DELETE,
                        "/channels/{channel_id}/messages/{message_id}",
                    )
                    .param(channel_id)
                    .param(message_id);
                    client
                        .call_unit(ctx, Request::new(route).reason(reason.as_str()))
                        .await?
                }
                None => client.delete_message(ctx, channel_id, message_id).await?,
            }
            serde_json::json!({ "deleted": message_id })
        }
        "request" => {
            let method_raw = args.get_one::<String>("method").map(String::as_str).unwrap_or("GET");
            let method = Method::from_bytes(method_raw.to_ascii_uppercase().as_bytes())
                .map_err(|_| Error::Config(format!("invalid method {method_raw:?}")))?;
            let path = args.get_one::<String>("path").cloned().unwrap_or_default();
            let mut request = Request::new(Route::raw(method, path));
            if let Some(data) = args.get_one::<String>("data") {
                let body: Value = serde_json::from_str(data)?;
                request = request.json(&body)?;
            }
            if let Some(reason) = args.get_one::<String>("reason") {
                request = request.reason(reason.as_str());
            }
            client.execute(ctx, request).await?.json::<Value>()?
        }
        other => return Err(Error::Config(format!("unknown command {other}"))),
    };
    Ok(value)
}
