use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[clap(name = "boxoffice", version)]
pub struct Cli {
    /// Correlation id for this run's logs; a fresh one is generated when absent
    #[clap(long, global = true, env = "TRACE_ID")]
    pub trace_id: Option<String>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create an event and its live inventory
    Provision {
        #[clap(long)]
        name: String,

        #[clap(long)]
        tickets: u64,

        /// Unit price in cents
        #[clap(long, default_value = "0")]
        price_cents: i64,
    },

    /// Book tickets for a user (request policy is checked first)
    Reserve {
        #[clap(long)]
        user: i64,

        #[clap(long)]
        event: i64,

        #[clap(long, default_value = "1")]
        quantity: u32,
    },

    /// Show the live available count of an event
    Available {
        #[clap(long)]
        event: i64,
    },

    /// List a user's bookings, newest first
    Tickets {
        #[clap(long)]
        user: i64,
    },

    /// Rebuild an event's counter from confirmed bookings
    Reconcile {
        #[clap(long)]
        event: i64,
    },

    /// Fire concurrent reservations at one event and report the outcome
    Simulate {
        #[clap(long)]
        event: i64,

        #[clap(long, default_value = "100")]
        buyers: u32,

        #[clap(long, default_value = "1")]
        quantity: u32,

        /// First user id; buyers get consecutive ids from here
        #[clap(long, default_value = "1")]
        first_user: i64,
    },
}

impl Command {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Command::Provision { .. } => "provision",
            Command::Reserve { .. } => "reserve",
            Command::Available { .. } => "available",
            Command::Tickets { .. } => "tickets",
            Command::Reconcile { .. } => "reconcile",
            Command::Simulate { .. } => "simulate",
        }
    }
}
