use anyhow::{bail, Context, Result};

use crate::config::{self, AppConfig};
use crate::model::{BoardKind, BoardView, Filter, PartitionKeyId};
use crate::providers::{self, Actor};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShowArgs {
    pub kind: Option<BoardKind>,
    pub issue_type: Option<String>,
    pub iteration: Option<i64>,
    pub title: Option<String>,
    pub page_size: Option<u64>,
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Show(ShowArgs),
    More {
        key: String,
        page: u64,
        show: ShowArgs,
    },
    Move {
        item_id: String,
        key: String,
        /// Column the item is currently shown in, when known.
        from: Option<String>,
        show: ShowArgs,
    },
    Help,
}

const USAGE: &str = "Usage: kanban <show|more|move> [options]\n\nRun `kanban help` for details.";

/// Parse everything after the program name.
pub fn parse_args(args: &[String]) -> Result<Command> {
    let Some((command, rest)) = args.split_first() else {
        return Ok(Command::Show(ShowArgs::default()));
    };

    let mut show = ShowArgs::default();
    let mut positional: Vec<String> = Vec::new();
    let mut page: Option<u64> = None;
    let mut from: Option<String> = None;
    let mut i = 0;

    while i < rest.len() {
        let flag = rest[i].as_str();
        match flag {
            "--json" => show.json = true,
            "--by" | "--type" | "--iteration" | "--title" | "--page-size" | "--page" | "--from" => {
                i += 1;
                let Some(value) = rest.get(i) else {
                    bail!("Missing value for {flag}");
                };
                match flag {
                    "--by" => show.kind = Some(value.parse().map_err(anyhow::Error::msg)?),
                    "--type" => show.issue_type = Some(value.clone()),
                    "--iteration" => show.iteration = Some(parse_number(flag, value)?),
                    "--title" => show.title = Some(value.clone()),
                    "--page-size" => show.page_size = Some(parse_number(flag, value)?),
                    "--from" => from = Some(value.clone()),
                    _ => page = Some(parse_number(flag, value)?),
                }
            }
            other if other.starts_with("--") => bail!("Unknown option {other}\n\n{USAGE}"),
            _ => positional.push(rest[i].clone()),
        }
        i += 1;
    }

    match command.as_str() {
        "show" => {
            expect_positionals(&positional, 0, "kanban show [options]")?;
            Ok(Command::Show(show))
        }
        "more" => {
            expect_positionals(&positional, 1, "kanban more <column-key> [--page N]")?;
            Ok(Command::More {
                key: positional.remove(0),
                page: page.unwrap_or(1).max(1),
                show,
            })
        }
        "move" => {
            expect_positionals(&positional, 2, "kanban move <item-id> <column-key> [--from <column-key>]")?;
            let key = positional.remove(1);
            Ok(Command::Move {
                item_id: positional.remove(0),
                key,
                from,
                show,
            })
        }
        "help" | "-h" | "--help" => Ok(Command::Help),
        other => bail!("Unknown command '{other}'\n\n{USAGE}"),
    }
}

fn parse_number<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow::anyhow!("{flag} expects a number, got '{value}'"))
}

fn expect_positionals(positional: &[String], count: usize, usage: &str) -> Result<()> {
    if positional.len() != count {
        bail!("Usage: {usage}");
    }
    Ok(())
}

/// Base filter from config with command-line overrides applied.
pub fn base_filter(config: &AppConfig, show: &ShowArgs) -> Filter {
    let mut filter = config.board.base_filter();
    if let Some(issue_type) = &show.issue_type {
        filter = filter.with_issue_type(issue_type.clone());
    }
    if let Some(iteration) = show.iteration {
        filter = filter.with_iteration(iteration);
    }
    if let Some(page_size) = show.page_size {
        filter.page_size = page_size.max(1);
    }
    filter.title = show.title.clone();
    filter
}

pub async fn run(command: Command) -> Result<()> {
    if command == Command::Help {
        print_help();
        return Ok(());
    }

    let config = config::load_config()?;
    let board = providers::create_board(&config)?;

    match command {
        Command::Show(show) => {
            let kind = show.kind.unwrap_or(config.board.kind);
            let view = board.render(kind, &base_filter(&config, &show)).await?;
            print_view(&view, show.json)?;
        }
        Command::More { key, page, show } => {
            let kind = show.kind.unwrap_or(config.board.kind);
            let mut base = base_filter(&config, &show);
            base.page_no = page;
            let keys = board.resolve(kind, &base.scope()).await?;
            let result = board
                .refresh_one(&base, &keys, &PartitionKeyId::from(key))
                .await?;
            let users = board.identify(&result.user_ids).await?;
            print_view(&BoardView { result, users }, show.json)?;
        }
        Command::Move {
            item_id,
            key,
            from,
            show,
        } => {
            let actor = config
                .board
                .actor
                .clone()
                .context("Moving items needs `actor` set in the [board] config table")?;
            let kind = show.kind.unwrap_or(config.board.kind);
            let base = base_filter(&config, &show);
            let keys = board.resolve(kind, &base.scope()).await?;
            let target = PartitionKeyId::from(key);
            let actor = Actor::new(actor);
            let result = match from {
                Some(from) => {
                    let from = PartitionKeyId::from(from);
                    board
                        .drag_item(&base, &keys, &item_id, &from, &target, &actor)
                        .await?
                }
                None => board.move_item(&base, &keys, &item_id, &target, &actor).await?,
            };
            let users = board.identify(&result.user_ids).await?;
            print_view(&BoardView { result, users }, show.json)?;
        }
        Command::Help => print_help(),
    }
    Ok(())
}

fn print_view(view: &BoardView, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(view)?);
    } else {
        print!("{}", format_board(view));
    }
    Ok(())
}

/// Plain-text column listing.
pub fn format_board(view: &BoardView) -> String {
    let mut out = String::new();
    for column in &view.result.columns {
        out.push_str(&format!(
            "{} [{}] {}/{}\n",
            column.key.label,
            column.key.id,
            column.cards.len(),
            column.total
        ));
        if column.cards.is_empty() {
            out.push_str("  (empty)\n");
        }
        for card in &column.cards {
            let item = &card.item;
            out.push_str(&format!("  {:<10} {}", item.id, item.title));
            if let Some(assignee) = &item.assignee {
                let name = view
                    .users
                    .iter()
                    .find(|u| &u.id == assignee)
                    .map(|u| u.nick.as_deref().unwrap_or(&u.name))
                    .unwrap_or(assignee);
                out.push_str(&format!(" @{name}"));
            }
            out.push('\n');
        }
        let shown = column
            .page_no
            .saturating_sub(1)
            .saturating_mul(column.page_size)
            .saturating_add(column.cards.len() as u64);
        if shown < column.total {
            out.push_str(&format!(
                "  ... kanban more {} --page {}\n",
                column.key.id,
                column.page_no.saturating_add(1)
            ));
        }
        out.push('\n');
    }
    out
}

pub fn print_help() {
    println!("kanban: concurrent kanban board over your issue tracker\n");
    println!("USAGE:");
    println!("  kanban show [options]                  Render every column of the board");
    println!("  kanban more <column-key> [--page N]    Fetch another page of one column");
    println!("  kanban move <item-id> <column-key>     Move an item, then re-render the board");
    println!();
    println!("OPTIONS:");
    println!("  --by <status|priority|deadline>  Board kind (default from config)");
    println!("  --type <TYPE>                    Issue type for a status board");
    println!("  --iteration <N>                  Restrict to one iteration");
    println!("  --title <TEXT>                   Only items whose title contains TEXT");
    println!("  --page-size <N>                  Items per column");
    println!("  --from <column-key>              Column the moved item is in now; same column is a no-op");
    println!("  --json                           Print the board as JSON");
    println!();
    println!("Config is read from ~/.kanban/config.toml or $KANBAN_CONFIG.");
    println!("Set RUST_LOG=kanban=debug to trace the aggregation.");
}
