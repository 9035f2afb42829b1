//! Host-side helper: `cargo run` builds the wasm package into `static/pkg`
//! and serves the demo page from `static/` on a local port.
//!
//! `cargo run -- --no-build 8080` skips the wasm build and picks the port.

use std::process::{Command, ExitCode, Stdio};
use std::{env, thread, time::Duration};

const DEFAULT_PORT: u16 = 8000;

struct Options {
    build: bool,
    port: u16,
}

fn parse_args() -> Result<Options, String> {
    let mut options = Options {
        build: true,
        port: DEFAULT_PORT,
    };
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--no-build" => options.build = false,
            other => {
                options.port = other
                    .parse()
                    .map_err(|_| format!("unrecognised argument {other:?}"))?;
            }
        }
    }
    Ok(options)
}

fn build_wasm() -> Result<(), String> {
    println!("Building WASM pkg …");
    match Command::new("wasm-pack")
        .args(["build", "--release", "--target", "web", "--out-dir", "static/pkg"])
        .status()
    {
        Ok(st) if st.success() => Ok(()),
        Ok(_) => Err("wasm-pack finished with errors".into()),
        Err(_) => {
            eprintln!("wasm-pack not found in PATH; serving whatever is already in static/pkg.");
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    let options = match parse_args() {
        Ok(options) => options,
        Err(err) => {
            eprintln!("{err}");
            eprintln!("usage: crt_wasm [--no-build] [PORT]");
            return ExitCode::from(2);
        }
    };

    if options.build {
        if let Err(err) = build_wasm() {
            eprintln!("{err}. Install wasm-pack from https://rustwasm.github.io/wasm-pack/.");
            return ExitCode::FAILURE;
        }
    }

    let port = options.port.to_string();
    println!("Serving the CRT demo at http://127.0.0.1:{port} …");
    let server = Command::new("python3")
        .args(["-m", "http.server", &port, "--directory", "static"])
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .spawn();
    let mut server = match server {
        Ok(child) => child,
        Err(err) => {
            eprintln!("failed to start python3 http.server: {err}");
            return ExitCode::FAILURE;
        }
    };

    loop {
        match server.try_wait() {
            Ok(Some(status)) => {
                eprintln!("http server exited with {status}");
                return ExitCode::FAILURE;
            }
            Ok(None) => thread::sleep(Duration::from_secs(1)),
            Err(err) => {
                eprintln!("lost track of the http server: {err}");
                return ExitCode::FAILURE;
            }
        }
    }
}
