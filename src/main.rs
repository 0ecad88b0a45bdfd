use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser};
use ncregrid::cli::{Cli, Commands, OutputFormat, RunOverrides, render_template};
use ncregrid::info::{
    get_file_info, print_file_info_human, print_file_info_json, print_file_info_yaml,
};
use ncregrid::input::JobConfig;
use ncregrid::log::{config_echo, show_farewell_with_timing, show_greeting};
use ncregrid::run_pipeline;
use std::fs;
use std::io;
use std::path::Path;
use std::time::Instant;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match &cli.command {
        Commands::Run {
            source,
            output,
            variable,
            cache_dir,
            grid,
            region,
            plots_dir,
            coastlines,
            dry_run,
        } => {
            let start_time = Instant::now();
            let show_progress = cli.shows_progress();
            let config_source = cli
                .config
                .as_ref()
                .map_or("defaults".to_string(), |p| p.display().to_string());
            if show_progress {
                show_greeting(&config_source);
            }

            let base = match &cli.config {
                Some(path) => load_config(path)?,
                None => JobConfig::default(),
            };
            let overrides = RunOverrides {
                source: source.clone(),
                output: output.clone(),
                variable: variable.clone(),
                cache_dir: cache_dir.clone(),
                grid: grid.clone(),
                region: *region,
                plots_dir: plots_dir.clone(),
                coastlines: coastlines.clone(),
            };
            let config = overrides.apply(base);
            if show_progress {
                config_echo(&config);
            }

            if *dry_run {
                config.validate().context("Invalid configuration")?;
                if show_progress {
                    println!("\nConfiguration is valid (dry run, nothing processed)");
                }
                return Ok(());
            }

            let report = run_pipeline(&config, show_progress, !show_progress)
                .await
                .context("Pipeline failed")?;

            match cli.output_format {
                OutputFormat::Human => {}
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Yaml => println!("{}", serde_yaml::to_string(&report)?),
            }
            if show_progress {
                show_farewell_with_timing(start_time.elapsed());
            }
        }

        Commands::Validate {
            config_file,
            detailed,
        } => {
            let path = match config_file.as_ref().or(cli.config.as_ref()) {
                Some(path) => path,
                None => bail!("No configuration file given; pass one or use --config"),
            };
            let config = load_config(path)?;
            config
                .validate()
                .with_context(|| format!("{} is not a valid configuration", path.display()))?;
            if !cli.quiet {
                println!("✓ {} is valid", path.display());
                if *detailed {
                    config_echo(&config);
                }
            }
        }

        Commands::Info {
            file,
            detailed,
            variable,
            format,
        } => {
            let info = get_file_info(file, variable.as_deref(), *detailed).await?;
            match format.as_ref().unwrap_or(&cli.output_format) {
                OutputFormat::Human => print_file_info_human(&info),
                OutputFormat::Json => print_file_info_json(&info)?,
                OutputFormat::Yaml => print_file_info_yaml(&info)?,
            }
        }

        Commands::Template {
            template_type,
            output,
            format,
        } => {
            let text = render_template(template_type, format)
                .map_err(|e| anyhow::anyhow!("Failed to render template: {}", e))?;
            match output {
                Some(path) => {
                    fs::write(path, text)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    if !cli.quiet {
                        println!("Template written to {}", path.display());
                    }
                }
                None => println!("{}", text),
            }
        }

        Commands::Completions { shell, output } => {
            let mut command = Cli::command();
            match output {
                Some(path) => {
                    let mut file = fs::File::create(path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    clap_complete::generate(*shell, &mut command, "ncregrid", &mut file);
                }
                None => {
                    clap_complete::generate(*shell, &mut command, "ncregrid", &mut io::stdout())
                }
            }
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<JobConfig> {
    JobConfig::from_file(path)
        .map_err(|e| anyhow::anyhow!("Failed to load configuration {}: {}", path.display(), e))
}
