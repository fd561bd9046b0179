pub mod commands;
pub mod handlers;

// Re-export commonly used handler functions for convenience
pub use handlers::{
    build_th_request, cache_config_from_args, load_urls_from_file, load_urls_from_source,
    measure_options_from_args, parse_url_line, th_client_from_args,
};
