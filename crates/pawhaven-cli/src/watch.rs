//! `pawhaven watch`: a protected view that keeps the session monitor mounted.
//!
//! Mounting happens only after the route guard grants access. The monitor
//! is unmounted on every exit path: expiry, failed renewal, Ctrl+C or the
//! end of stdin.

use std::sync::Arc;

use anyhow::Result;
use chrono::Local;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use pawhaven_core::{Access, MonitorEvent, RenewalFlow, SessionMonitor};

use crate::commands::{format_remaining, print_redirect, Context};

const WATCH_PATH: &str = "/watch";

pub async fn run(ctx: Context, auto_renew: bool) -> Result<()> {
    let guard = ctx.route_guard();
    let session = match guard.check(WATCH_PATH) {
        Access::Granted(session) => session,
        Access::Redirect(redirect) => {
            print_redirect(&redirect);
            return Ok(());
        }
    };
    println!(
        "Session active, {} left. Press Ctrl+C to stop watching.",
        format_remaining(session.time_left(ctx.clock.now()))
    );

    let mut config = ctx.config.monitor_config();
    config.auto_renew |= auto_renew;
    let auto_renew = config.auto_renew;

    let renewal = RenewalFlow::new(
        Arc::clone(&ctx.service),
        ctx.store.clone(),
        Arc::clone(&ctx.clock),
        ctx.config.validity_window(),
    );
    let mut handle =
        SessionMonitor::new(ctx.store.clone(), Arc::clone(&ctx.clock), config).start(renewal);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut awaiting_answer = false;

    loop {
        tokio::select! {
            event = handle.next_event() => {
                let Some(event) = event else { break };
                show(&event, auto_renew);
                if matches!(event, MonitorEvent::WarningRaised { .. }) && !auto_renew {
                    awaiting_answer = true;
                }
                if let Some(redirect) = guard.reevaluate(&event, WATCH_PATH) {
                    print_redirect(&redirect);
                    break;
                }
            }
            line = lines.next_line(), if awaiting_answer => {
                awaiting_answer = false;
                match line {
                    Ok(Some(answer)) if is_yes(&answer) => {
                        if !handle.request_renewal() {
                            warn!("Monitor did not accept the renewal request");
                        }
                    }
                    Ok(Some(_)) => println!("Not renewing. The session will end when it expires."),
                    Ok(None) => {
                        debug!("stdin closed");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read answer");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    handle.stop().await;
    Ok(())
}

fn show(event: &MonitorEvent, auto_renew: bool) {
    match event {
        MonitorEvent::WarningRaised { remaining } if auto_renew => {
            println!(
                "Session expires in {}. Renewing...",
                format_remaining(*remaining)
            );
        }
        MonitorEvent::WarningRaised { remaining } => {
            println!(
                "Session expires in {}. Renew now? [y/N]",
                format_remaining(*remaining)
            );
        }
        MonitorEvent::Renewed { expiry } => {
            println!(
                "Session renewed until {}.",
                expiry.with_timezone(&Local).format("%H:%M:%S")
            );
        }
        MonitorEvent::Expired => println!("Session expired."),
        MonitorEvent::RenewalFailed { error } => println!("Could not renew the session: {}", error),
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
