use clap::Parser;
use tracing::info;

use webserv::config::Config;
use webserv::db;
use webserv::error::Result;
use webserv::logging;
use webserv::reactor::Reactor;

fn main() -> Result<()> {
    let config = Config::parse();
    let _log_guard = logging::init(&config);

    info!(port = config.port, root = %config.root, "starting webserv");

    let pool = db::build_pool(&config.db_name, config.db_pool_size)?;
    let mut reactor = Reactor::new(&config, pool)?;

    // Destruction order is reactor -> pool -> logger, per the spec's
    // Design Notes: `reactor` and `_log_guard` are dropped in reverse
    // declaration order at the end of `main`, and `reactor` owns the pool,
    // so this order falls out of ordinary scoping.
    reactor.run()?;

    Ok(())
}
