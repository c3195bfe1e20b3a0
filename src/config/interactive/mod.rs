
use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};

use super::{Config, ConfigError, OllamaConfig};
use crate::scoring::{ScoringPolicy, ScoringWeights};

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 Resume Match Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir);

    eprintln!("{}", style("Ollama Configuration").bold().yellow());
    eprintln!("Configure the Ollama instance used to embed resumes and job descriptions.");
    eprintln!();

    configure_ollama(&mut config.ollama)?;

    eprintln!();
    if Confirm::new()
        .with_prompt("Customize scoring weights?")
        .default(false)
        .interact()?
    {
        configure_weights(&mut config.scoring)?;
    }

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if test_ollama_connection(&config.ollama) {
        eprintln!("{}", style("✓ Ollama connection successful!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not connect to Ollama").yellow()
        );
        eprintln!("You can continue, but make sure Ollama is running before converting records.");
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Ollama Settings:").bold().yellow());
    eprintln!("  Host: {}", style(&config.ollama.host).cyan());
    eprintln!("  Port: {}", style(config.ollama.port).cyan());
    eprintln!("  Model: {}", style(&config.ollama.model).cyan());
    eprintln!("  Batch Size: {}", style(config.ollama.batch_size).cyan());
    eprintln!(
        "  Timeout: {}",
        style(format!("{}s", config.ollama.timeout_seconds)).cyan()
    );
    eprintln!(
        "  Retry Attempts: {}",
        style(config.ollama.retry_attempts).cyan()
    );
    match config.ollama_url() {
        Ok(url) => eprintln!("  Ollama URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  Ollama URL: {} ({})", style("Invalid").red(), e),
    }

    let policy = &config.scoring;
    eprintln!();
    eprintln!("{}", style("Scoring Policy:").bold().yellow());
    eprintln!(
        "  Weights: summary {:.2}, skills {:.2}, responsibilities {:.2}, experience {:.2}",
        policy.weights.summary,
        policy.weights.skills,
        policy.weights.responsibilities,
        policy.weights.experience
    );
    eprintln!(
        "  Coverage floors: skills {:.2}, responsibilities {:.2}",
        policy.floors.skills, policy.floors.responsibilities
    );
    eprintln!(
        "  Certification threshold: {:.2} (neutral score {:.0})",
        policy.certification_match_threshold, policy.certification_neutral_score
    );

    eprintln!();
    eprintln!(
        "Vector store: {}",
        style(config.vector_store_path().display()).dim()
    );
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config(config_dir: &Path) -> Config {
    Config::load(config_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No usable configuration found. Using defaults.").yellow()
            );
            Config {
                base_dir: config_dir.to_path_buf(),
                ..Config::default()
            }
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            config
        },
    )
}

fn configure_ollama(ollama: &mut OllamaConfig) -> Result<()> {
    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == ollama.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Ollama protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols
        .get(protocol_index)
        .copied()
        .unwrap_or("http")
        .to_string();

    let host: String = Input::new()
        .with_prompt("Ollama host")
        .default(ollama.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = OllamaConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                ..OllamaConfig::default()
            };
            temp_config.validate()
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Ollama port")
        .default(ollama.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let model: String = Input::new()
        .with_prompt("Embedding model")
        .default(ollama.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let batch_size: u32 = Input::new()
        .with_prompt("Batch size for embedding generation")
        .default(ollama.batch_size)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if *input == 0 {
                Err("Batch size must be greater than 0")
            } else if *input > 1000 {
                Err("Batch size must be 1000 or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let timeout_seconds: u64 = Input::new()
        .with_prompt("Embedding request timeout (seconds)")
        .default(ollama.timeout_seconds)
        .validate_with(|input: &u64| -> Result<(), &str> {
            if (1..=600).contains(input) {
                Ok(())
            } else {
                Err("Timeout must be between 1 and 600 seconds")
            }
        })
        .interact_text()?;

    ollama.set_protocol(protocol)?;
    ollama.set_host(host)?;
    ollama.set_port(port)?;
    ollama.set_model(model)?;
    ollama.set_batch_size(batch_size)?;
    ollama.set_timeout_seconds(timeout_seconds)?;

    Ok(())
}

fn configure_weights(policy: &mut ScoringPolicy) -> Result<()> {
    let prompt_weight = |name: &str, current: f64| -> Result<f64> {
        let weight: f64 = Input::new()
            .with_prompt(format!("{name} weight"))
            .default(current)
            .validate_with(|input: &f64| -> Result<(), &str> {
                if (0.0..=1.0).contains(input) {
                    Ok(())
                } else {
                    Err("Weight must be between 0 and 1")
                }
            })
            .interact_text()?;
        Ok(weight)
    };

    loop {
        let weights = ScoringWeights {
            summary: prompt_weight("Summary", policy.weights.summary)?,
            skills: prompt_weight("Skills", policy.weights.skills)?,
            responsibilities: prompt_weight("Responsibilities", policy.weights.responsibilities)?,
            experience: prompt_weight("Experience", policy.weights.experience)?,
        };

        let candidate = ScoringPolicy { weights, ..*policy };
        match candidate.validate() {
            Ok(()) => {
                *policy = candidate;
                return Ok(());
            }
            Err(e) => eprintln!("{}", style(format!("✗ {e}")).red()),
        }
    }
}

fn test_ollama_connection(ollama: &OllamaConfig) -> bool {
    let url = format!(
        "{}://{}:{}/api/version",
        ollama.protocol, ollama.host, ollama.port
    );

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(std::time::Duration::from_secs(5)))
        .build()
        .into();

    match agent.get(&url).call() {
        Ok(_) => true,
        Err(ureq::Error::StatusCode(code)) if (400..500).contains(&code) => true,
        Err(_) => false,
    }
}
