// main.rs — process entry point
//
// `Server/main.cpp` just constructs a `Server` and binds a hardcoded port;
// this core additionally resolves a map fingerprint from an optional BSP
// file and reports a non-zero exit code on an unrecoverable run error.

use std::process::ExitCode;

use vnet_common::asset_hash::compute_map_md5;
use vnet_server::bsp::compute_map_md5_from_file;
use vnet_server::config::Config;
use vnet_server::server::Server;

fn main() -> ExitCode {
    let config = match Config::parse(std::env::args().skip(1)) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("usage: vnet-server <map-name> [--port N] [--bsp path] [--tick-rate hz] [--show-errors bool]");
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let map_md5 = match &config.bsp_path {
        Some(path) => match compute_map_md5_from_file(path) {
            Ok(md5) => md5,
            Err(err) => {
                eprintln!("failed to read BSP at {}: {err}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => {
            println!("no --bsp given; serving {} with the empty-record map fingerprint", config.map_name);
            compute_map_md5(&[])
        }
    };

    let mut server = match Server::bind(&config, map_md5) {
        Ok(server) => server,
        Err(err) => {
            eprintln!("failed to bind port {}: {err}", config.port);
            return ExitCode::FAILURE;
        }
    };

    println!("listening on port {} for map {}", config.port, config.map_name);
    match server.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("server loop exited: {err}");
            ExitCode::FAILURE
        }
    }
}
