pub mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::task::JoinSet;
use tracing::Instrument;

use booking::app::App;
use booking::config::AppConfig;
use booking::{ReservationError, ReservationService};
use common::logger::{TraceId, annotate_span, init_tracing, root_span};
use ledger::{EventId, NewEvent, UserId};

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = AppConfig::from_env().context("invalid configuration")?;
    init_tracing(cfg.json_logs);

    let app = App::build(&cfg).await?;

    let trace_id = cli.trace_id.map(TraceId::new).unwrap_or_default();
    let span = root_span(cli.command.name(), &trace_id);
    let outcome = run(&app, cli.command).instrument(span).await;

    app.shutdown().await;
    outcome
}

async fn run(app: &App, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Provision {
            name,
            tickets,
            price_cents,
        } => {
            let event = app
                .service
                .provision_event(NewEvent {
                    name,
                    total_tickets: tickets,
                    price_cents,
                })
                .await?;
            annotate_span(event.id.0, None);
            println!(
                "Event #{} \"{}\" created with {} ticket(s).",
                event.id, event.name, event.total_tickets
            );
        }

        Command::Reserve {
            user,
            event,
            quantity,
        } => {
            annotate_span(event, Some(user));
            let (user_id, event_id) = (UserId(user), EventId(event));

            app.policy
                .check(app.service.ledger().as_ref(), user_id, event_id, quantity)
                .await?;

            match app.service.reserve(user_id, event_id, quantity).await {
                Ok(booking) => println!(
                    "Booked {} ticket(s) for event #{}. Reference {}.",
                    booking.quantity, booking.event_id, booking.id
                ),
                Err(e) if e.is_retryable() => {
                    return Err(e).context("Booking is busy, please try again.");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Command::Available { event } => {
            annotate_span(event, None);
            let available = app.service.available_count(EventId(event)).await?;
            println!("Event #{event}: {available} ticket(s) available.");
        }

        Command::Tickets { user } => {
            let tickets = app.service.ledger().bookings_for_user(UserId(user)).await?;
            if tickets.is_empty() {
                println!("No tickets for user {user}.");
            }
            for t in tickets {
                let total = t.total_cents();
                println!(
                    "{}  {} x {} (event #{})  {}.{:02}  {}",
                    t.booking.id,
                    t.booking.quantity,
                    t.event_name,
                    t.booking.event_id,
                    total / 100,
                    total % 100,
                    t.booking.status
                );
            }
        }

        Command::Reconcile { event } => {
            annotate_span(event, None);
            let available = app.service.reconcile_inventory(EventId(event)).await?;
            println!("Event #{event} reconciled: {available} ticket(s) available.");
        }

        Command::Simulate {
            event,
            buyers,
            quantity,
            first_user,
        } => {
            annotate_span(event, None);
            let tally = simulate(&app.service, EventId(event), buyers, quantity, first_user).await;
            let available = app.service.available_count(EventId(event)).await?;
            println!(
                "{buyers} buyer(s): {} booked, {} sold out, {} busy, {} failed; {available} ticket(s) left.",
                tally.booked, tally.sold_out, tally.busy, tally.failed
            );
        }
    }

    Ok(())
}

#[derive(Debug, Default)]
struct Tally {
    booked: u32,
    sold_out: u32,
    busy: u32,
    failed: u32,
}

/// One concurrent `reserve` per buyer, each with its own user id.
async fn simulate(
    service: &Arc<ReservationService>,
    event_id: EventId,
    buyers: u32,
    quantity: u32,
    first_user: i64,
) -> Tally {
    let mut tasks = JoinSet::new();
    for i in 0..buyers {
        let service = Arc::clone(service);
        let user_id = UserId(first_user + i64::from(i));
        tasks.spawn(
            async move { service.reserve(user_id, event_id, quantity).await }
                .instrument(tracing::info_span!("buyer", user_id = %user_id)),
        );
    }

    let mut tally = Tally::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(_)) => tally.booked += 1,
            Ok(Err(ReservationError::SoldOut { .. })) => tally.sold_out += 1,
            Ok(Err(ReservationError::Busy { .. })) => tally.busy += 1,
            Ok(Err(e)) => {
                tracing::error!(error = ?e, "simulated reservation failed");
                tally.failed += 1;
            }
            Err(e) => {
                tracing::error!(error = ?e, "simulated buyer task panicked");
                tally.failed += 1;
            }
        }
    }
    tally
}
