//! Interactive reference host for cardlock flows.
//!
//! Runs the lock controllers against the simulated card bank from a
//! line-oriented prompt, standing in for a real settings UI. Every flow
//! the engine supports can be driven end to end: toggling the lock,
//! changing the PIN, PIN/PUK recovery, cancellation, and a simulated host
//! restart that exercises the snapshot handoff.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use cardlock_core::{
    CardHandle, CardId, Completion, ControllerSnapshot, FlowOutcome, LockManager,
};
use cardlock_service::{
    CredentialService, ServiceCompletion, ServiceDriver, SimCardConfig, SimService,
};

#[derive(Parser)]
#[command(name = "cardlock", version)]
#[command(about = "Interactive harness for credential-card lock flows")]
struct Cli {
    /// Number of simulated card slots
    #[arg(long, default_value_t = 1)]
    cards: u32,

    /// PIN installed on every simulated card
    #[arg(long, default_value = "1234")]
    pin: String,

    /// Boot the cards demanding their PIN
    #[arg(long)]
    locked: bool,

    /// Simulated verification latency in milliseconds
    #[arg(long, default_value_t = 150)]
    latency_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cardlock=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let service = SimService::new();
    service.set_latency(Duration::from_millis(cli.latency_ms));

    let mut manager = LockManager::new();
    for slot in 0..cli.cards.max(1) {
        let card = CardId::new(slot);
        let puk = service.provision(
            card,
            SimCardConfig {
                pin: cli.pin.clone(),
                puk: None,
                lock_enabled: true,
                start_locked: cli.locked,
            },
        );
        println!("{card}: provisioned (PIN {}, PUK {puk})", cli.pin);
        manager.attach(Box::new(service.handle(card)));
    }

    let (driver, completions) = ServiceDriver::new(Arc::new(service.clone()));
    info!(cards = cli.cards.max(1), "session ready");

    let mut session = Session {
        manager,
        driver,
        service,
        current: CardId::new(0),
    };
    session.run(completions).await
}

struct Session {
    manager: LockManager,
    driver: ServiceDriver,
    service: SimService,
    current: CardId,
}

impl Session {
    async fn run(
        &mut self,
        mut completions: tokio::sync::mpsc::UnboundedReceiver<ServiceCompletion>,
    ) -> Result<()> {
        println!("Type 'help' for commands.");
        self.show_prompt()?;

        let stdin = BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    if !self.handle_line(line.trim())? {
                        break;
                    }
                    self.show_prompt()?;
                }
                Some(completion) = completions.recv() => {
                    self.handle_completion(completion);
                    self.show_prompt()?;
                }
            }
        }
        Ok(())
    }

    /// One line of user input. Returns false to end the session.
    fn handle_line(&mut self, line: &str) -> Result<bool> {
        let mut words = line.split_whitespace();
        match words.next() {
            None => {}
            Some("help") => print_help(),
            Some("quit") | Some("exit") => return Ok(false),
            Some("status") => self.print_status(),
            Some("use") => match words.next().and_then(|w| w.parse::<u32>().ok()) {
                Some(slot) if self.manager.controller(CardId::new(slot)).is_some() => {
                    self.current = CardId::new(slot);
                    println!("now driving {}", self.current);
                }
                _ => println!("usage: use <slot>"),
            },
            Some("enable") => self.start(|c| c.start_toggle(true)),
            Some("disable") => self.start(|c| c.start_toggle(false)),
            Some("change") => self.start(|c| c.start_change_pin()),
            Some("unlock") => self.start(|c| c.start_unlock()),
            Some("cancel") => {
                if let Some(controller) = self.manager.controller_mut(self.current) {
                    controller.cancel();
                    println!("flow cancelled");
                }
            }
            Some("outage") => match words.next() {
                Some("on") => self.service.set_unreachable(true),
                Some("off") => self.service.set_unreachable(false),
                _ => println!("usage: outage on|off"),
            },
            Some("eject") => {
                self.service.remove_card(self.current);
                println!("{} ejected", self.current);
            }
            Some("reload") => self.reload()?,
            // Anything else is treated as credential entry for the
            // current card's dialog.
            Some(_) => self.submit(line),
        }
        Ok(true)
    }

    fn start(&mut self, begin: impl FnOnce(&mut cardlock_core::LockController) -> cardlock_core::Result<()>) {
        match self.manager.controller_mut(self.current) {
            Some(controller) => {
                if let Err(err) = begin(controller) {
                    println!("cannot start: {err}");
                }
            }
            None => println!("no card attached at {}", self.current),
        }
    }

    fn submit(&mut self, text: &str) {
        let Some(controller) = self.manager.controller_mut(self.current) else {
            println!("no card attached at {}", self.current);
            return;
        };
        match controller.submit(text) {
            Ok(Some(request)) => self.driver.dispatch(request),
            Ok(None) => {}
            Err(err) => println!("rejected: {err}"),
        }
    }

    fn handle_completion(&mut self, completion: ServiceCompletion) {
        let card = completion.card;
        match self
            .manager
            .on_service_complete(card, completion.request, completion.result)
        {
            Completion::Done(outcome) => self.report_outcome(card, outcome),
            Completion::Reprompt | Completion::Stale => {}
        }
    }

    fn report_outcome(&self, card: CardId, outcome: FlowOutcome) {
        match outcome {
            FlowOutcome::LockToggled { enabled } => {
                println!("{card}: lock {}", if enabled { "enabled" } else { "disabled" })
            }
            FlowOutcome::PinChanged => println!("{card}: PIN changed"),
            FlowOutcome::Unlocked => println!("{card}: unlocked"),
            FlowOutcome::CardBlocked => println!("{card}: card permanently blocked"),
        }
    }

    /// Simulate a host restart: snapshot every dialog, tear the manager
    /// down, rebuild it from the serialized handoff, and resume.
    fn reload(&mut self) -> Result<()> {
        let snapshots = self.manager.snapshot_all();
        let json = serde_json::to_string(&snapshots)?;
        info!(bytes = json.len(), "dialog state handed off");

        let snapshots: Vec<ControllerSnapshot> = serde_json::from_str(&json)?;
        let service = self.service.clone();
        self.manager = LockManager::restore_all(snapshots, |card| {
            Some(Box::new(service.handle(card)) as Box<dyn CardHandle>)
        })?;
        for (card, outcome) in self.manager.resume_all() {
            self.report_outcome(card, outcome);
        }
        println!("host restarted; dialogs restored");
        Ok(())
    }

    fn print_status(&self) {
        for card in self.manager.cards() {
            let status = self.service.status(card);
            if !status.present {
                println!("{card}: no card");
                continue;
            }
            println!(
                "{card}: lock_enabled={} state={:?} pin_attempts={} puk_attempts={}",
                status.lock_enabled,
                status.lock_state,
                format_attempts(status.pin_attempts_remaining),
                format_attempts(status.puk_attempts_remaining),
            );
        }
    }

    fn show_prompt(&self) -> Result<()> {
        if let Some(controller) = self.manager.controller(self.current) {
            if let Some(prompt) = controller.current_prompt() {
                if let Some(err) = &prompt.error {
                    println!("  ! {err}");
                }
                if prompt.busy {
                    println!("[{}] verifying...", prompt.title);
                } else {
                    println!(
                        "[{}] {} ({}-{} digits)",
                        prompt.title, prompt.message, prompt.min_len, prompt.max_len
                    );
                }
            }
        }
        print!("{}> ", self.current);
        std::io::stdout().flush()?;
        Ok(())
    }
}

fn format_attempts(attempts: Option<u32>) -> String {
    match attempts {
        Some(n) => n.to_string(),
        None => "?".to_string(),
    }
}

fn print_help() {
    println!("commands:");
    println!("  enable | disable   toggle the PIN lock on the current card");
    println!("  change             change the current card's PIN");
    println!("  unlock             unlock a card demanding its PIN or PUK");
    println!("  cancel             abandon the active flow");
    println!("  status             show every card's lock status");
    println!("  use <slot>         switch the current card");
    println!("  outage on|off      simulate verification-service outage");
    println!("  eject              remove the current card");
    println!("  reload             simulate a host restart (snapshot + resume)");
    println!("  quit               end the session");
    println!("anything else is submitted to the active dialog as entry text");
}
