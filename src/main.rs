use std::error::Error;
use std::path::PathBuf;
use std::process;

use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use tracing_subscriber::EnvFilter;

use grove::aggregate::{Filters, Query};
use grove::config::Config;
use grove::item::{ContentType, GrowthStage, ItemId};
use grove::site::Site;
use grove::store::DirectoryStore;

fn main() {
    let matches = App::new("grove")
        .about("Indexes a digital garden: backlinks, listings and reading trails")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("project")
                .long("project")
                .takes_value(true)
                .value_name("DIR")
                .help("Directory to search for grove.yaml (defaults to the current directory)"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Log debug output"),
        )
        .subcommand(
            SubCommand::with_name("check")
                .about("Reports skipped documents, broken links and orphans"),
        )
        .subcommand(SubCommand::with_name("tags").about("Lists tags by usage"))
        .subcommand(
            SubCommand::with_name("backlinks")
                .about("Lists the items referencing an item")
                .arg(Arg::with_name("ID").required(true).help("e.g. notes/ownership")),
        )
        .subcommand(
            SubCommand::with_name("path")
                .about("Validates a comma-separated reading trail")
                .arg(Arg::with_name("TRAIL").required(true)),
        )
        .subcommand(
            SubCommand::with_name("list")
                .about("Lists content across every type, newest first")
                .arg(
                    Arg::with_name("type")
                        .long("type")
                        .takes_value(true)
                        .multiple(true)
                        .number_of_values(1),
                )
                .arg(
                    Arg::with_name("tag")
                        .long("tag")
                        .takes_value(true)
                        .multiple(true)
                        .number_of_values(1),
                )
                .arg(
                    Arg::with_name("stage")
                        .long("stage")
                        .takes_value(true)
                        .multiple(true)
                        .number_of_values(1),
                )
                .arg(Arg::with_name("sort").long("sort").takes_value(true))
                .arg(Arg::with_name("page").long("page").takes_value(true))
                .arg(Arg::with_name("page-size").long("page-size").takes_value(true)),
        )
        .get_matches();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if matches.is_present("verbose") {
            "grove=debug"
        } else {
            "grove=info"
        })
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    match run(&matches) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("ERROR {}", e);
            process::exit(1);
        }
    }
}

fn run(matches: &ArgMatches) -> Result<i32, Box<dyn Error>> {
    let dir = match matches.value_of("project") {
        Some(dir) => PathBuf::from(dir),
        None => std::env::current_dir()?,
    };
    let config = Config::from_directory(&dir)?;
    let site = Site::new(DirectoryStore::new(&config.content_directory), &config);

    match matches.subcommand() {
        ("check", Some(_)) => {
            let warnings = site.warnings();
            for warning in &warnings {
                println!("warning: {}", warning);
            }
            let broken = site.broken_links();
            for (source, target) in &broken {
                println!("broken link: {} -> {}", source, target);
            }
            for orphan in site.orphans() {
                println!("orphan: {}", orphan);
            }
            let items = site.snapshot().items.len();
            println!(
                "{} items, {} warnings, {} broken links",
                items,
                warnings.len(),
                broken.len()
            );
            Ok(if warnings.is_empty() && broken.is_empty() { 0 } else { 1 })
        }
        ("tags", Some(_)) => {
            let counts = site.tag_counts();
            let mut tags: Vec<(&String, &usize)> = counts.iter().collect();
            tags.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
            for (tag, count) in tags {
                println!("{:>4}  {}", count, tag);
            }
            Ok(0)
        }
        ("backlinks", Some(sub)) => {
            let id: ItemId = sub.value_of("ID").unwrap_or_default().parse()?;
            site.item(&id)?;
            for item in site.backlinks_for(id.content_type, &id.slug) {
                println!("{}  {}  {}", item.created.format("%Y-%m-%d"), item.id, item.title);
            }
            Ok(0)
        }
        ("path", Some(sub)) => {
            let path = site.validate_path(sub.value_of("TRAIL").unwrap_or_default());
            for (i, step) in path.steps.iter().enumerate() {
                println!("{:>2}. {}", i + 1, step);
            }
            if let Some(truncation) = &path.truncation {
                println!(
                    "truncated at entry {} (`{}`): {}",
                    truncation.index + 1,
                    truncation.entry,
                    truncation.reason
                );
            }
            Ok(0)
        }
        ("list", Some(sub)) => {
            let query = list_query(sub, site.default_query())?;
            let page = site.mixed_content(&query);
            for item in &page.items {
                println!(
                    "{}  {:<9}  {:<28}  {}",
                    item.created.format("%Y-%m-%d"),
                    item.stage.name(),
                    item.id.to_string(),
                    item.title
                );
            }
            println!(
                "page {} of {} ({} items)",
                page.page, page.total_pages, page.total_items
            );
            Ok(0)
        }
        _ => Ok(2),
    }
}

fn list_query(matches: &ArgMatches, default: Query) -> Result<Query, Box<dyn Error>> {
    let mut filters = Filters::default();
    for value in matches.values_of("type").into_iter().flatten() {
        filters = filters.with_type(value.parse::<ContentType>()?);
    }
    for value in matches.values_of("tag").into_iter().flatten() {
        filters = filters.with_tag(value);
    }
    for value in matches.values_of("stage").into_iter().flatten() {
        filters = filters.with_stage(value.parse::<GrowthStage>()?);
    }

    let mut query = default.with_filters(filters);
    if let Some(sort) = matches.value_of("sort") {
        query = query.with_sort(sort.parse()?);
    }
    if let Some(page) = matches.value_of("page") {
        query.page = page.parse()?;
    }
    if let Some(size) = matches.value_of("page-size") {
        query.page_size = size.parse()?;
    }
    Ok(query)
}
