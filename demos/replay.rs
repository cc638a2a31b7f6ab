use clap::{Parser, ValueEnum};
use log::info;

use psg_rs::layout::Layout;
use psg_rs::replay::Replayer;
use psg_rs::trace::{Event, Op, Value};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Scenario {
    /// `p = NULL;`
    Null,
    /// `p = malloc(); free(p);`
    Free,
    /// `p = malloc(); q = p; free(p); use q;`
    Alias,
    /// Build a two-cell list, walk it, then free the head.
    List,
    /// `p = malloc(); p->next = NULL; p = NULL;`
    Leak,
}

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Built-in trace to replay.
    #[arg(value_enum, default_value = "alias")]
    scenario: Scenario,

    /// Model a doubly-linked structure (`next` and `prev`).
    #[clap(long)]
    doubly: bool,

    /// Print every graph in DOT format after the replay.
    #[clap(long)]
    dot: bool,

    /// Log level.
    #[clap(long, value_name = "LEVEL", default_value = "info")]
    log: simplelog::LevelFilter,
}

fn trace(scenario: Scenario, doubly: bool) -> Vec<Event> {
    match scenario {
        Scenario::Null => vec![Event::declare(1, "p"), Event::assign(2, "p", Value::Null)],
        Scenario::Free => vec![Event::assign(1, "p", Value::Alloc), Event::free(2, "p")],
        Scenario::Alias => vec![
            Event::assign(1, "p", Value::Alloc),
            Event::assign(2, "q", Value::var("p")),
            Event::free(3, "p"),
            Event::op(4, "q", None, Op::DanglingCheck),
        ],
        Scenario::List => {
            let mut events = vec![
                Event::assign(1, "head", Value::Alloc),
                Event::store(2, "head", "next", Value::Alloc),
                Event::assign(3, "cur", Value::field("head", "next")),
                Event::store(4, "cur", "next", Value::Null),
            ];
            if doubly {
                events.push(Event::store(5, "head", "prev", Value::Null));
                events.push(Event::store(6, "cur", "prev", Value::var("head")));
            }
            events.push(Event::op(7, "cur", Some("next"), Op::NullCheck));
            events.push(Event::free(8, "head"));
            events.push(Event::op(9, "cur", None, Op::DanglingCheck));
            events
        }
        Scenario::Leak => vec![
            Event::assign(1, "p", Value::Alloc),
            Event::store(2, "p", "next", Value::Null),
            Event::assign(3, "p", Value::Null),
        ],
    }
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args = Cli::parse();

    simplelog::TermLogger::init(
        args.log,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    println!("args = {:?}", args);

    let layout = if args.doubly {
        Layout::doubly("next", "prev")
    } else {
        Layout::singly("next")
    };
    let mut replayer = Replayer::new(layout);

    let time_replay = std::time::Instant::now();
    for event in trace(args.scenario, args.doubly) {
        println!("{}", event);
        replayer.step(&event)?;
    }
    info!("Replay done in {:.3}s", time_replay.elapsed().as_secs_f64());

    for (i, psg) in replayer.graphs().iter().enumerate() {
        println!("graph {}:\n{}", i, psg);
        if args.dot {
            println!("{}", psg.to_dot()?);
        }
    }

    for obs in replayer.observations() {
        println!("event {}: {} is {}", obs.id, obs.location, obs.state);
    }

    let time_analyze = std::time::Instant::now();
    let report = replayer.analyze()?;
    info!("Analysis done in {:.3}s", time_analyze.elapsed().as_secs_f64());
    print!("{}", report);

    Ok(())
}
