// Copyright 2025 JsBind Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # JsBind CLI
//!
//! Loads a JavaScript API surface into a Boa-backed bridge and drives it from
//! the command line.
//!
//! ## Usage
//!
//! ```bash
//! # Read a property (outputs raw JSON)
//! jsbind invoke -s api.js -p runtime.id
//!
//! # Call a function with arguments
//! jsbind invoke -s api.js -p tabs.query -f -a '[{"active": true}]'
//!
//! # Serve newline-delimited JSON requests on stdin/stdout
//! jsbind stdio -s api.js
//! ```

use anyhow::Result;
use argh::FromArgs;
use jsbind_common::{Argument, BridgeMessage, InvocationRequest};
use jsbind_runtime::{BoaEnvironment, BridgeConfig, BridgeHandle, StdioServer};
use serde_json::Value as JsonValue;

/// JsBind - invoke JavaScript APIs through a typed bridge
#[derive(FromArgs)]
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Invoke(InvokeArgs),
    Stdio(StdioArgs),
}

/// Arguments for a single invocation.
///
/// The result is written to stdout as raw JSON. A retained result prints as
/// `{"referenceId": "..."}`; the reference does not outlive the process.
#[derive(FromArgs)]
#[argh(subcommand, name = "invoke")]
/// invoke a member of the loaded JavaScript API
struct InvokeArgs {
    /// path to the JavaScript file defining the API surface
    #[argh(option, short = 's')]
    script: String,

    /// dot-separated member path, relative to the root handle
    #[argh(option, short = 'p')]
    path: String,

    /// call the member instead of reading it
    #[argh(switch, short = 'f')]
    function: bool,

    /// JSON array of by-value arguments
    ///
    /// Defaults to `[]`.
    #[argh(option, short = 'a', long = "args", default = "\"[]\".into()")]
    args: String,

    /// retain the result as an object reference under this id
    #[argh(option, short = 'r', long = "retain")]
    retain: Option<String>,

    /// optional JSON bridge configuration file
    #[argh(option, long = "config")]
    config: Option<String>,
}

/// Arguments for the stdio server.
///
/// Reads one `Request` envelope per line on stdin and writes one `Response`
/// per line on stdout. Logs go to stderr.
#[derive(FromArgs)]
#[argh(subcommand, name = "stdio")]
/// serve bridge requests over stdin/stdout
struct StdioArgs {
    /// path to the JavaScript file defining the API surface
    #[argh(option, short = 's')]
    script: String,

    /// optional JSON bridge configuration file
    #[argh(option, long = "config")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Logs go to stderr; invoke stays quiet unless RUST_LOG is set
    let default_level = match cli.command {
        Commands::Invoke(_) => "off",
        Commands::Stdio(_) => "info",
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Invoke(args) => run_invoke(args).await,
        Commands::Stdio(args) => run_stdio(args).await,
    }
}

fn load_config(path: Option<&str>) -> Result<BridgeConfig> {
    match path {
        Some(path) => BridgeConfig::from_json_file(path)
            .map_err(|e| anyhow::anyhow!("Invalid bridge configuration {}: {}", path, e)),
        None => Ok(BridgeConfig::default()),
    }
}

async fn start_bridge(script: String, config: BridgeConfig) -> Result<BridgeHandle> {
    tracing::info!("Loading JavaScript API from {}", script);
    let bridge = BridgeHandle::spawn(config, move |config| BoaEnvironment::from_file(&script, config)).await?;
    tracing::info!("Bridge ready with root handle '{}'", bridge.root_handle());
    Ok(bridge)
}

fn parse_arguments(args: &str) -> Result<Vec<Argument>> {
    let value: JsonValue =
        serde_json::from_str(args).map_err(|e| anyhow::anyhow!("Invalid JSON in args: {}", e))?;
    match value {
        JsonValue::Array(items) => Ok(items.into_iter().map(Argument::from).collect()),
        other => Err(anyhow::anyhow!("args must be a JSON array, got {}", other)),
    }
}

async fn run_invoke(args: InvokeArgs) -> Result<()> {
    let arguments = parse_arguments(&args.args)?;
    let config = load_config(args.config.as_deref())?;
    let bridge = start_bridge(args.script, config).await?;

    let mut request = if args.function {
        InvocationRequest::call(bridge.root_handle(), args.path)
    } else {
        InvocationRequest::get(bridge.root_handle(), args.path)
    }
    .with_arguments(arguments);
    if let Some(retain) = args.retain {
        request = request.with_return_reference(retain);
    }

    let result = bridge.send(BridgeMessage::Invoke(request)).await;
    bridge.shutdown().await?;

    println!("{}", serde_json::to_string(&result?)?);
    Ok(())
}

async fn run_stdio(args: StdioArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let bridge = start_bridge(args.script, config).await?;

    let server = StdioServer::new(bridge.clone());
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let result = server.serve(stdin, tokio::io::stdout()).await;

    tracing::info!("Input closed, shutting down bridge");
    bridge.shutdown().await?;
    Ok(result?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_invoke_property() {
        let args: Cli = Cli::from_args(&["jsbind"], &["invoke", "-s", "api.js", "-p", "runtime.id"]).unwrap();
        match args.command {
            Commands::Invoke(InvokeArgs { script, path, function, args, retain, config }) => {
                assert_eq!(script, "api.js");
                assert_eq!(path, "runtime.id");
                assert!(!function);
                assert_eq!(args, "[]"); // default
                assert!(retain.is_none());
                assert!(config.is_none());
            }
            _ => panic!("Expected Invoke command"),
        }
    }

    #[test]
    fn test_cli_parse_invoke_function_with_args() {
        let args: Cli = Cli::from_args(&["jsbind"], &[
            "invoke",
            "-s", "api.js",
            "-p", "tabs.query",
            "-f",
            "-a", "[{\"active\":true}]",
            "--retain", "ref-1",
        ]).unwrap();
        match args.command {
            Commands::Invoke(InvokeArgs { path, function, args, retain, .. }) => {
                assert_eq!(path, "tabs.query");
                assert!(function);
                assert_eq!(args, "[{\"active\":true}]");
                assert_eq!(retain, Some("ref-1".to_string()));
            }
            _ => panic!("Expected Invoke command"),
        }
    }

    #[test]
    fn test_cli_parse_stdio() {
        let args: Cli = Cli::from_args(&["jsbind"], &["stdio", "-s", "api.js", "--config", "bridge.json"]).unwrap();
        match args.command {
            Commands::Stdio(StdioArgs { script, config }) => {
                assert_eq!(script, "api.js");
                assert_eq!(config, Some("bridge.json".to_string()));
            }
            _ => panic!("Expected Stdio command"),
        }
    }

    #[test]
    fn test_cli_requires_script() {
        assert!(Cli::from_args(&["jsbind"], &["invoke", "-p", "runtime.id"]).is_err());
    }

    #[test]
    fn test_parse_arguments_accepts_array_only() {
        let arguments = parse_arguments("[1, \"a\", null]").unwrap();
        assert_eq!(arguments.len(), 3);
        assert_eq!(arguments[1], Argument::from(serde_json::json!("a")));

        assert!(parse_arguments("{\"a\": 1}").is_err());
        assert!(parse_arguments("[1,").is_err());
    }
}
