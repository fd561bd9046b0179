use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use clap::ArgMatches;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;
use websteps_core::cache::CacheConfig;
use websteps_core::crawl::{MeasureResultCallback, measure_url_steps, measure_url_with};
use websteps_core::report::{
    generate_measurement_report, generate_steps_report, write_jsonl_report, write_jsonl_steps,
};
use websteps_core::thelper::{ThEndpointPlan, ThRequestOptions, router};
use websteps_core::{
    CachingMeasurer, MeasureOptions, ProbeCache, ThClient, ThHandler, ThRequest, TracingSink,
    UrlMeasurement,
};
use websteps_scanner::{DirectMeasurer, Measurer, NetworkType};

// Helper functions for the measure handler

/// Load URLs from either a file or a single URL argument
pub fn load_urls_from_source(
    url: Option<&Url>,
    input_file: Option<&PathBuf>,
) -> Result<Vec<String>, String> {
    if let Some(input_file_path) = input_file {
        load_urls_from_file(input_file_path)
    } else if let Some(url) = url {
        Ok(vec![url.as_str().to_string()])
    } else {
        Err("Either --url or --input-file must be provided".to_string())
    }
}

/// Load and parse URLs from a file, skipping blank lines and `#` comments
pub fn load_urls_from_file(path: &Path) -> Result<Vec<String>, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read input file {}: {}", path.display(), e))?;

    let urls: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(parse_url_line)
        .collect();

    if urls.is_empty() {
        return Err(format!("No valid URLs found in {}", path.display()));
    }

    Ok(urls)
}

/// Parse a single line as a URL, trying to add http:// if needed
pub fn parse_url_line(line: &str) -> Option<String> {
    if Url::parse(line).is_ok() {
        return Some(line.to_string());
    }

    let with_scheme = format!("http://{}", line);
    if Url::parse(&with_scheme).is_ok() {
        return Some(with_scheme);
    }

    warn!("Skipping invalid URL '{}'", line);
    None
}

/// Reads `--cache-dir` and `--mostly-cache`, expanding `~` in the path
pub fn cache_config_from_args(args: &ArgMatches) -> Option<CacheConfig> {
    let dir = args.get_one::<String>("cache-dir")?;
    let expanded = shellexpand::tilde(dir);
    Some(CacheConfig::new(expanded.into_owned()).mostly_cache(args.get_flag("mostly-cache")))
}

pub fn measure_options_from_args(args: &ArgMatches) -> MeasureOptions {
    MeasureOptions {
        max_redirects: args
            .get_one::<usize>("max-redirects")
            .copied()
            .unwrap_or(websteps_core::crawl::DEFAULT_MAX_REDIRECTS),
        force_both_schemes: !args.get_flag("only-scheme"),
        ..MeasureOptions::default()
    }
}

/// Reads `--backend`. Without it, `measure` works without a test helper.
pub fn th_client_from_args(args: &ArgMatches) -> Result<Option<ThClient>> {
    match args.get_one::<Url>("backend") {
        Some(backend) => Ok(Some(ThClient::new(backend.as_str())?)),
        None => Ok(None),
    }
}

/// Builds the request `thctl` submits to the test helper
pub fn build_th_request(
    input: &str,
    both: bool,
    tcp_endpoints: &[String],
    quic_endpoints: &[String],
) -> ThRequest {
    let entry = |network: NetworkType, address: &String| ThEndpointPlan {
        network: network.as_str().to_string(),
        address: address.clone(),
        url: input.to_string(),
        cookies: Vec::new(),
    };
    let mut plan: Vec<ThEndpointPlan> = quic_endpoints
        .iter()
        .map(|a| entry(NetworkType::Quic, a))
        .collect();
    plan.extend(tcp_endpoints.iter().map(|a| entry(NetworkType::Tcp, a)));
    ThRequest {
        url: input.to_string(),
        options: ThRequestOptions {
            do_not_initially_force_http_and_https: !both,
        },
        plan,
    }
}

/// Opens the cache, trims it once and keeps trimming it until `cancel`
/// fires. Returns the measurer to use.
fn open_measurer(
    direct: DirectMeasurer,
    cache_config: Option<CacheConfig>,
    cancel: &CancellationToken,
) -> Result<Arc<dyn Measurer>> {
    let Some(config) = cache_config else {
        return Ok(Arc::new(direct));
    };
    let cache = Arc::new(
        ProbeCache::open_with_config(&config)
            .with_context(|| format!("Failed to open cache in {}", config.dir.display()))?,
    );
    info!("Trimming the cache at {}", cache.path().display());
    cache.trim()?;
    cache.start_trimmer(config.trim_interval, cancel.clone());
    Ok(Arc::new(CachingMeasurer::new(direct, cache)))
}

pub async fn handle_measure(args: &ArgMatches, quiet: bool) -> Result<()> {
    let url = args.get_one::<Url>("url");
    let input_file = args.get_one::<PathBuf>("input-file");
    let urls = load_urls_from_source(url, input_file).map_err(|e| anyhow!(e))?;
    let output = args
        .get_one::<PathBuf>("output")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("report.jsonl"));
    let timeout = args.get_one::<u64>("timeout").copied().unwrap_or(10);
    let options = measure_options_from_args(args);
    let th_client = th_client_from_args(args)?;
    if let Some(ref client) = th_client {
        info!("Comparing against the test helper at {}", client.backend());
    }

    let cancel = CancellationToken::new();
    let measurer = open_measurer(
        DirectMeasurer::with_timeout(timeout),
        cache_config_from_args(args),
        &cancel,
    )?;

    let progress_bar = if quiet {
        None
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .map_err(|e| anyhow!(e))?,
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(Arc::new(pb))
    };

    for (idx, input) in urls.iter().enumerate() {
        let callback: Option<MeasureResultCallback> = progress_bar.clone().map(|pb| {
            let cb: MeasureResultCallback = Arc::new(move |um: &UrlMeasurement| {
                pb.set_message(format!(
                    "Measured {} ({} endpoints)",
                    um.url,
                    um.endpoint().len()
                ));
            });
            cb
        });
        if let Some(ref pb) = progress_bar {
            pb.set_message(format!("Measuring {}/{}: {}", idx + 1, urls.len(), input));
        }

        let begin = Utc::now();
        let summary = match th_client {
            Some(ref client) => {
                let measured = measure_url_steps(
                    measurer.as_ref(),
                    input,
                    &options,
                    client,
                    &cancel,
                    callback,
                    &TracingSink,
                )
                .await;
                let steps = match measured {
                    Ok(steps) => steps,
                    Err(e) => {
                        warn!("Cannot measure {}: {}", input, e);
                        continue;
                    }
                };
                write_jsonl_steps(&output, begin, input, &steps)
                    .with_context(|| format!("Failed to write report {}", output.display()))?;
                generate_steps_report(&steps)
            }
            None => {
                let measured =
                    measure_url_with(measurer.as_ref(), input, &options, callback, &TracingSink)
                        .await;
                let tree = match measured {
                    Ok(tree) => tree,
                    Err(e) => {
                        warn!("Cannot measure {}: {}", input, e);
                        continue;
                    }
                };
                write_jsonl_report(&output, begin, input, &tree)
                    .with_context(|| format!("Failed to write report {}", output.display()))?;
                generate_measurement_report(&tree)
            }
        };

        if let Some(ref pb) = progress_bar {
            pb.suspend(|| print!("{}", summary));
        }
    }

    if let Some(ref pb) = progress_bar {
        pb.finish_with_message(format!(
            "{} Report written to {}",
            "✓".green().bold(),
            output.display()
        ));
    }
    cancel.cancel();
    Ok(())
}

pub async fn handle_thd(args: &ArgMatches) -> Result<()> {
    let address = args
        .get_one::<String>("address")
        .cloned()
        .unwrap_or_else(|| "0.0.0.0:9876".to_string());

    let cancel = CancellationToken::new();
    let measurer = open_measurer(DirectMeasurer::new(), cache_config_from_args(args), &cancel)?;
    let app = router(Arc::new(ThHandler::new(measurer)));

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind test helper to {}", address))?;
    info!("Listening at: \"{}\"", address);

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutting down");
            }
            shutdown.cancel();
        })
        .await
        .context("Test helper server error")?;
    Ok(())
}

pub async fn handle_thctl(args: &ArgMatches) -> Result<()> {
    let input = args
        .get_one::<String>("input")
        .ok_or_else(|| anyhow!("--input is required"))?;
    let backend = args
        .get_one::<String>("url")
        .cloned()
        .unwrap_or_else(|| websteps_core::thelper::DEFAULT_TH_URL.to_string());
    let tcp: Vec<String> = args
        .get_many::<String>("tcp-endpoint")
        .map(|v| v.cloned().collect())
        .unwrap_or_default();
    let quic: Vec<String> = args
        .get_many::<String>("quic-endpoint")
        .map(|v| v.cloned().collect())
        .unwrap_or_default();

    let request = build_th_request(input, args.get_flag("both"), &tcp, &quic);
    println!("{}", serde_json::to_string(&request)?);

    let begin = Utc::now();
    let client = ThClient::new(&backend)?;
    let response = client
        .submit(request, CancellationToken::new())
        .await
        .context("Test helper task vanished")?
        .context("TH failed")?;

    if args.get_flag("archival") {
        println!("{}", serde_json::to_string(&response.to_archival(begin))?);
    } else {
        println!("{}", serde_json::to_string(&response)?);
    }
    Ok(())
}
