//! Centralised helpers for user-facing CLI output written to stderr.

use crate::swap::form::FormView;
use std::io::{IsTerminal as _, Write as _};

fn stderr_write(s: &str) {
    let mut stderr = std::io::stderr().lock();
    if stderr.write_all(s.as_bytes()).is_err() {
        return;
    }
    let _flush = stderr.flush();
}

pub fn stderr_writeln(s: &str) {
    let mut stderr = std::io::stderr().lock();
    if stderr.write_all(s.as_bytes()).is_err() {
        return;
    }
    if stderr.write_all(b"\n").is_err() {
        return;
    }
    let _flush = stderr.flush();
}

/// Only show banners and prompts when a human is watching stderr. `ZEROSWAP_BANNER` forces it.
pub fn interactive_output() -> bool {
    match std::env::var("ZEROSWAP_BANNER") {
        Ok(v) => {
            let v = v.trim().to_ascii_lowercase();
            !(v.is_empty() || v == "0" || v == "false" || v == "no" || v == "off")
        }
        Err(_) => std::io::stderr().is_terminal(),
    }
}

/// Print the proxy startup banner to stderr (human-operator info only).
pub fn print_serve_banner(version: &str, listen_addr: &str, api_key_configured: bool) {
    let key = if api_key_configured { "set" } else { "MISSING" };
    stderr_writeln(&format!(
        "zeroswap proxy\n==============\nVersion : v{version}\nListen  : http://{listen_addr}\nAPI key : {key}\n\nRoutes  : GET /api/price, GET /api/quote, POST /api/analytics"
    ));
}

pub fn print_swap_banner(version: &str, proxy: &str, wallet: Option<&str>) {
    let wallet = wallet.unwrap_or("not connected (prices only)");
    stderr_writeln(&format!(
        "zeroswap v{version}\nProxy  : {proxy}\nWallet : {wallet}\n\nType `help` for commands."
    ));
}

pub fn print_swap_help() {
    stderr_writeln(
        "  <amount> | amount <x>   set the sell amount (`clear` empties it)\n  \
         sell <token>            pick the sell token (symbol or address)\n  \
         buy <token>             pick the buy token\n  \
         chain <id|name>         switch chain (resets the pair)\n  \
         flip                    swap direction\n  \
         review                  fetch a firm quote\n  \
         submit                  send the quoted transaction\n  \
         show | link | quit",
    );
}

pub fn print_view(view: &FormView) {
    stderr_writeln(&view.to_string());
}

pub fn print_problem(msg: &str) {
    stderr_writeln(&format!("  ! {msg}"));
}

pub fn print_prompt() {
    stderr_write("> ");
}
