//! Startup banner.

use std::env;

use ipreroute_core::{LookupConfig, RerouteConfig};

use crate::{args::Args, config, env_vars};

/// Print startup banner with configuration
pub fn print_startup_info(args: &Args) {
    if args.quiet {
        // Quiet mode: only essential information
        println!(
            "🚀 {} v{} starting on port {}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            args.listen
        );
        return;
    }

    println!("🛡️  {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    println!("   {}", env!("CARGO_PKG_DESCRIPTION"));
    println!();
    println!("📡 Network Configuration:");
    println!("   Listen:         {}:{}", args.bind, args.listen);
    println!("   Pass-through:   {}:{}", args.bind, args.forward);
    println!();

    print_reroute_config(config::get_reroute_config());
    print_lookup_config(config::get_lookup_config());

    let max_connections = config::get_max_connections();
    println!("🔧 Server Limits:");
    if max_connections == 0 {
        println!("   Connections:    unlimited");
    } else {
        println!("   Connections:    {max_connections} max");
    }

    if args.verbose {
        print_env_config();
    }

    println!();
    println!("🚀 Server starting...");
}

fn print_reroute_config(reroute: &RerouteConfig) {
    println!("🔀 Reroute Policy:");
    println!("   Flag Store:     {}", reroute.redis_address);
    println!("   Key Prefix:     {}", reroute.reroute_key);
    println!(
        "   Target:         {}://{}:{}",
        reroute.reroute_scheme,
        reroute.server_name(),
        reroute.reroute_port
    );
}

fn print_lookup_config(lookup: &LookupConfig) {
    println!("⏱️  Flag Lookup:");
    println!("   Deadline:       {} ms", lookup.timeout.as_millis());
    println!(
        "   TTL Check:      {}",
        if lookup.check_ttl { "enabled" } else { "disabled" }
    );
    println!("   Idle Pool:      {}", lookup.max_idle_connections);
}

/// Print environment variable configuration status (used in verbose mode)
fn print_env_config() {
    println!();
    println!("🔧 Environment Variables:");

    for &var_name in env_vars::all_env_vars() {
        match env::var(var_name) {
            Ok(value) => println!("   {var_name:<20} = {value}"),
            Err(_) => println!("   {var_name:<20} = [NOT SET]"),
        }
    }
}
