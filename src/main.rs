use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use clap::Parser;
use log::{error, info, warn};
use lobby::config::Config;
use lobby::routes::routes;

/// Checks that the certificate chain and key actually parse before handing
/// the paths to warp, which would otherwise panic at startup.
fn tls_files_usable(cert_path: &Path, key_path: &Path) -> bool {
    let cert_file = match File::open(cert_path) {
        Ok(file) => file,
        Err(e) => {
            error!("Failed to open certificate file {}: {}", cert_path.display(), e);
            return false;
        }
    };
    let key_file = match File::open(key_path) {
        Ok(file) => file,
        Err(e) => {
            error!("Failed to open private key file {}: {}", key_path.display(), e);
            return false;
        }
    };

    let cert_reader = &mut BufReader::new(cert_file);
    let key_reader = &mut BufReader::new(key_file);

    match rustls_pemfile::certs(cert_reader).collect::<Result<Vec<_>, _>>() {
        Ok(certs) if !certs.is_empty() => {}
        Ok(_) => {
            error!("No certificates found in {}", cert_path.display());
            return false;
        }
        Err(e) => {
            error!("Failed to parse certificate: {}", e);
            return false;
        }
    }

    match rustls_pemfile::private_key(key_reader) {
        Ok(Some(_)) => true,
        Ok(None) => {
            error!("No private key found in {}", key_path.display());
            false
        }
        Err(e) => {
            error!("Failed to parse private key: {}", e);
            false
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::parse();
    let state = lobby::app_state(&config);
    let routes = routes(state, config.static_dir.clone());
    let addr = config.addr();

    match config.tls_paths() {
        Some((cert, key)) if tls_files_usable(cert, key) => {
            info!("Starting secure server (HTTPS/WSS) on {}", addr);
            warp::serve(routes)
                .tls()
                .cert_path(cert)
                .key_path(key)
                .run(addr)
                .await;
        }
        Some(_) => {
            warn!("Failed to load TLS config, falling back to HTTP/WS on {}", addr);
            warp::serve(routes).run(addr).await;
        }
        None => {
            info!("Server starting on {}", addr);
            warp::serve(routes).run(addr).await;
        }
    }
}
