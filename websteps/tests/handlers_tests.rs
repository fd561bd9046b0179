use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use url::Url;
use websteps::commands::command_argument_builder;
use websteps::handlers::*;
use websteps_core::CachingPolicy;

#[test]
fn test_parse_url_line_with_scheme() {
    let result = parse_url_line("https://example.com");
    assert_eq!(result, Some("https://example.com".to_string()));
}

#[test]
fn test_parse_url_line_without_scheme() {
    let result = parse_url_line("example.com");
    assert_eq!(result, Some("http://example.com".to_string()));
}

#[test]
fn test_parse_url_line_invalid() {
    let result = parse_url_line("not a valid url!!!");
    assert_eq!(result, None);
}

#[test]
fn test_load_urls_from_file() -> Result<(), Box<dyn std::error::Error>> {
    let mut temp_file = NamedTempFile::new()?;
    writeln!(temp_file, "https://example.com")?;
    writeln!(temp_file, "# a comment")?;
    writeln!(temp_file, "httpbin.org")?;
    writeln!(temp_file)?; // Empty line
    writeln!(temp_file, "https://api.example.com")?;

    let path = PathBuf::from(temp_file.path());
    let urls = load_urls_from_file(&path)?;

    assert_eq!(urls.len(), 3);
    assert_eq!(urls[0], "https://example.com");
    assert_eq!(urls[1], "http://httpbin.org");
    assert_eq!(urls[2], "https://api.example.com");

    Ok(())
}

#[test]
fn test_load_urls_from_file_empty() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file).unwrap();
    writeln!(temp_file, "   ").unwrap();

    let path = PathBuf::from(temp_file.path());
    let result = load_urls_from_file(&path);

    assert!(result.is_err());
    assert!(result.unwrap_err().contains("No valid URLs"));
}

#[test]
fn test_load_urls_from_source_single_url() {
    let url = Url::parse("https://example.com").unwrap();
    let result = load_urls_from_source(Some(&url), None).unwrap();

    assert_eq!(result.len(), 1);
    assert_eq!(result[0], "https://example.com/");
}

#[test]
fn test_load_urls_from_source_no_input() {
    let result = load_urls_from_source(None, None);
    assert!(result.is_err());
    assert!(
        result
            .unwrap_err()
            .contains("Either --url or --input-file must be provided")
    );
}

// ============================================================================
// Argument Tests
// ============================================================================

#[test]
fn test_measure_defaults() {
    let matches = command_argument_builder()
        .try_get_matches_from(["websteps", "measure", "-u", "http://example.org"])
        .unwrap();
    let (name, args) = matches.subcommand().unwrap();
    assert_eq!(name, "measure");

    let options = measure_options_from_args(args);
    assert_eq!(options.max_redirects, 10);
    assert!(options.force_both_schemes);
    assert!(cache_config_from_args(args).is_none());
    assert!(th_client_from_args(args).unwrap().is_none());
}

#[test]
fn test_measure_backend_builds_th_client() {
    let matches = command_argument_builder()
        .try_get_matches_from([
            "websteps",
            "measure",
            "-u",
            "http://example.org",
            "-b",
            "http://127.0.0.1:9876/",
        ])
        .unwrap();
    let (_, args) = matches.subcommand().unwrap();

    let client = th_client_from_args(args).unwrap().unwrap();
    assert_eq!(client.backend(), "http://127.0.0.1:9876/");
}

#[test]
fn test_measure_backend_must_be_a_url() {
    let result = command_argument_builder().try_get_matches_from([
        "websteps",
        "measure",
        "-u",
        "http://example.org",
        "--backend",
        "not a url",
    ]);
    assert!(result.is_err());
}

#[test]
fn test_measure_options_from_flags() {
    let matches = command_argument_builder()
        .try_get_matches_from([
            "websteps",
            "measure",
            "-u",
            "https://example.org",
            "--max-redirects",
            "3",
            "--only-scheme",
        ])
        .unwrap();
    let (_, args) = matches.subcommand().unwrap();

    let options = measure_options_from_args(args);
    assert_eq!(options.max_redirects, 3);
    assert!(!options.force_both_schemes);
}

#[test]
fn test_mostly_cache_requires_cache_dir() {
    let result = command_argument_builder().try_get_matches_from([
        "websteps",
        "thd",
        "--mostly-cache",
    ]);
    assert!(result.is_err());
}

#[test]
fn test_cache_config_expands_tilde() {
    let matches = command_argument_builder()
        .try_get_matches_from([
            "websteps",
            "thd",
            "-C",
            "~/websteps-cache",
            "--mostly-cache",
        ])
        .unwrap();
    let (_, args) = matches.subcommand().unwrap();

    let config = cache_config_from_args(args).unwrap();
    assert!(!config.dir.starts_with("~"));
    assert!(config.dir.ends_with("websteps-cache"));
    assert!(config.mostly_cache);
    assert_eq!(config.policy().name(), "forever");
}

#[test]
fn test_cache_config_reasonable_by_default() {
    let matches = command_argument_builder()
        .try_get_matches_from(["websteps", "thd", "-C", "/tmp/websteps-cache"])
        .unwrap();
    let (_, args) = matches.subcommand().unwrap();

    let config = cache_config_from_args(args).unwrap();
    assert_eq!(config.dir, PathBuf::from("/tmp/websteps-cache"));
    assert_eq!(config.policy().name(), "reasonable");
}

// ============================================================================
// Test Helper Request Tests
// ============================================================================

#[test]
fn test_build_th_request_without_endpoints() {
    let request = build_th_request("https://example.org/", false, &[], &[]);
    assert_eq!(request.url, "https://example.org/");
    assert!(request.options.do_not_initially_force_http_and_https);
    assert!(request.plan.is_empty());
}

#[test]
fn test_build_th_request_with_endpoints() {
    let tcp = vec!["10.0.0.1:443".to_string(), "10.0.0.2:443".to_string()];
    let quic = vec!["10.0.0.1:443".to_string()];
    let request = build_th_request("https://example.org/", true, &tcp, &quic);

    assert!(!request.options.do_not_initially_force_http_and_https);
    let networks: Vec<&str> = request.plan.iter().map(|p| p.network.as_str()).collect();
    assert_eq!(networks, vec!["quic", "tcp", "tcp"]);
    assert!(request.plan.iter().all(|p| p.url == "https://example.org/"));
    assert_eq!(request.plan[2].address, "10.0.0.2:443");
}

#[test]
fn test_thctl_collects_repeated_endpoints() {
    let matches = command_argument_builder()
        .try_get_matches_from([
            "websteps",
            "thctl",
            "-i",
            "https://example.org/",
            "--tcp-endpoint",
            "10.0.0.1:443",
            "--tcp-endpoint",
            "10.0.0.2:443",
            "--both",
        ])
        .unwrap();
    let (_, args) = matches.subcommand().unwrap();

    let tcp: Vec<String> = args
        .get_many::<String>("tcp-endpoint")
        .unwrap()
        .cloned()
        .collect();
    assert_eq!(tcp.len(), 2);
    assert!(args.get_flag("both"));
    assert_eq!(
        args.get_one::<String>("url").map(String::as_str),
        Some(websteps_core::thelper::DEFAULT_TH_URL)
    );
}
