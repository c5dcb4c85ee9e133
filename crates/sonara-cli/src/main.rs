// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use sonara_config::load as load_config;
use sonara_spotify::endpoint::{EndpointDescriptor, ParamKind};
use sonara_spotify::{AllOptions, EndpointId, ParamValue, Params, SpotifyClient};
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Call Spotify Web API endpoints and print the JSON result.
///
/// Examples:
///   sonara-cli artist -p id=0OdUWJ0sBjDrqHygGUXeCF
///   sonara-cli artist_albums -p id=0OdUWJ0sBjDrqHygGUXeCF --all --field items
///   sonara-cli tracks --ids 3n3Ppam7vgaVa1iaRUc9Lp,3twNvmDtFQtAd5gMKedhLD --all
#[derive(Debug, Parser)]
#[command(name = "sonara-cli")]
#[command(version)]
#[command(about = "Call Spotify Web API endpoints and print the JSON result")]
struct Cli {
    /// Endpoint name, e.g. `artist_albums`.
    #[arg(value_name = "ENDPOINT", required_unless_present = "list_endpoints")]
    endpoint: Option<String>,

    /// Endpoint parameter; may be repeated.
    #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,

    /// Comma-separated IDs, URIs or URLs for the endpoint's ID list.
    #[arg(long, value_delimiter = ',')]
    ids: Vec<String>,

    /// Fetch every page, or every chunk of `--ids`, as one result.
    #[arg(long)]
    all: bool,

    /// Chunk size for `--all` over an ID list.
    #[arg(long, requires = "all")]
    chunk_size: Option<usize>,

    /// Drop repeated IDs before chunking.
    #[arg(long, requires = "all")]
    unique: bool,

    /// Print only this field of the result.
    #[arg(long)]
    field: Option<String>,

    /// Configuration file (TOML).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// List endpoint names and exit.
    #[arg(long)]
    list_endpoints: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.list_endpoints {
        for id in EndpointId::ALL {
            println!("{id}");
        }
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config.telemetry.log_level);

    let name = cli
        .endpoint
        .as_deref()
        .ok_or_else(|| anyhow!("an endpoint name is required"))?;
    let id: EndpointId = name.parse()?;
    let params = build_params(id.descriptor(), &cli.params, &cli.ids)?;

    let client = SpotifyClient::from_config(&config)?;
    let endpoint = client.endpoint(id);
    info!(target: "cli", endpoint = %id, all = cli.all, "issuing request");

    let handle = if cli.all {
        let mut options = AllOptions::new().unique(cli.unique);
        options.chunk_size = cli.chunk_size;
        endpoint.all(params, options)?
    } else {
        endpoint.call(params)?
    };

    let value = handle.fetch(cli.field.as_deref()).await?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn init_tracing(default_level: &str) {
    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn build_params(descriptor: &EndpointDescriptor, raw: &[String], ids: &[String]) -> Result<Params> {
    let mut params = Params::new();
    for pair in raw {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("parameter `{pair}` is not KEY=VALUE"))?;
        params.set(key, parse_value(descriptor, key, value)?);
    }

    if !ids.is_empty() {
        let target = descriptor
            .batch
            .map(|batch| batch.param)
            .or_else(|| descriptor.param("ids").map(|spec| spec.name))
            .ok_or_else(|| anyhow!("{} takes no ID list", descriptor.name))?;
        debug!(target: "cli", param = target, count = ids.len(), "using --ids");
        params.set(target, ParamValue::Strings(ids.to_vec()));
    }
    Ok(params)
}

/// Parse a command-line value according to the parameter's declared kind.
fn parse_value(descriptor: &EndpointDescriptor, key: &str, value: &str) -> Result<ParamValue> {
    let Some(spec) = descriptor.param(key) else {
        if descriptor.open_query {
            return Ok(ParamValue::Str(value.to_string()));
        }
        bail!("{} has no parameter `{key}`", descriptor.name);
    };

    Ok(match spec.kind {
        ParamKind::Integer => ParamValue::Int(
            value
                .parse()
                .with_context(|| format!("`{key}` must be an integer"))?,
        ),
        ParamKind::Boolean => ParamValue::Bool(
            value
                .parse()
                .with_context(|| format!("`{key}` must be true or false"))?,
        ),
        ParamKind::Ids(_) | ParamKind::Uris(_) | ParamKind::UriObjects(_) | ParamKind::StringList => {
            ParamValue::Strings(value.split(',').map(str::to_string).collect())
        }
        ParamKind::Json => ParamValue::Json(
            serde_json::from_str(value).with_context(|| format!("`{key}` must be JSON"))?,
        ),
        ParamKind::String | ParamKind::Id(_) => ParamValue::Str(value.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_args() {
        let cli = Cli::parse_from([
            "sonara-cli",
            "tracks",
            "--ids",
            "a,b,c",
            "--all",
            "--chunk-size",
            "2",
            "-p",
            "market=SE",
        ]);
        assert_eq!(cli.endpoint.as_deref(), Some("tracks"));
        assert_eq!(cli.ids, vec!["a", "b", "c"]);
        assert_eq!(cli.chunk_size, Some(2));
        assert_eq!(cli.params, vec!["market=SE"]);
    }

    #[test]
    fn test_values_follow_declared_kinds() {
        let descriptor = EndpointId::ArtistAlbums.descriptor();
        let params = build_params(
            descriptor,
            &["id=abc".to_string(), "limit=20".to_string(), "include_groups=album,single".to_string()],
            &[],
        )
        .unwrap();

        assert_eq!(params.get("id"), Some(&ParamValue::Str("abc".into())));
        assert_eq!(params.int("limit"), Some(20));
        assert_eq!(
            params.get("include_groups"),
            Some(&ParamValue::Str("album,single".into()))
        );
    }

    #[test]
    fn test_bad_values_are_rejected() {
        let descriptor = EndpointId::ArtistAlbums.descriptor();
        assert!(build_params(descriptor, &["limit=many".to_string()], &[]).is_err());
        assert!(build_params(descriptor, &["nonsense".to_string()], &[]).is_err());
        assert!(build_params(descriptor, &["colour=red".to_string()], &[]).is_err());
    }

    #[test]
    fn test_ids_fill_the_batch_parameter() {
        let descriptor = EndpointId::PlaylistAddTracks.descriptor();
        let params = build_params(descriptor, &["playlist_id=pl".to_string()], &["t1".to_string()]).unwrap();
        assert_eq!(params.get("uris"), Some(&ParamValue::Strings(vec!["t1".into()])));

        assert!(build_params(EndpointId::Me.descriptor(), &[], &["x".to_string()]).is_err());
    }

    #[test]
    fn test_open_query_accepts_tunables() {
        let descriptor = EndpointId::Recommendations.descriptor();
        let params = build_params(descriptor, &["target_energy=0.8".to_string()], &[]).unwrap();
        assert_eq!(params.get("target_energy"), Some(&ParamValue::Str("0.8".into())));
    }
}
