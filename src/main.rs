use clap::Parser;
use vm_provision::config::LogFormat;
use vm_provision::utils::{logger, validation::Validate};
use vm_provision::{
    default_credential, render_plan, ArmClient, CliConfig, Command, PollSettings, ProvisionEngine,
    ProvisionError, ProvisionSettings, Provisioner,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 先載入 .env，讓 clap 能讀到其中的環境變數
    let dotenv_path = dotenvy::dotenv().ok();

    let config = CliConfig::parse();

    // 初始化日誌
    match config.log_format {
        LogFormat::Text => logger::init_cli_logger(config.verbose),
        LogFormat::Json => logger::init_json_logger(config.verbose),
    }

    tracing::info!("Starting vm-provision");
    if let Some(path) = dotenv_path {
        tracing::debug!("Loaded environment from {}", path.display());
    }

    let settings = match config.to_settings().and_then(|s| s.validate().map(|_| s)) {
        Ok(settings) => settings,
        Err(e) => fail(&e),
    };

    if let Err(e) = dispatch(&config, settings).await {
        fail(&e);
    }

    Ok(())
}

async fn dispatch(config: &CliConfig, settings: ProvisionSettings) -> vm_provision::Result<()> {
    match config.command() {
        Command::Plan => {
            tracing::info!("🔍 PLAN MODE - No requests will be sent to Azure");
            let plan = render_plan(&settings)?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
            Ok(())
        }
        Command::Up => {
            let ssh_public_key = settings.require_ssh_public_key()?.to_string();
            let engine = build_engine(config, settings);
            let report = engine.run(&ssh_public_key).await?;

            println!();
            println!("Virtual machine '{}' created successfully!", report.vm_name);
            match (&report.public_ip, report.ssh_command()) {
                (Some(ip), Some(ssh)) => {
                    println!("Public IP: {}", ip);
                    println!("Connect using: {}", ssh);
                }
                _ => println!("Public IP: not assigned yet"),
            }
            Ok(())
        }
        Command::Down { yes } => {
            if !yes {
                return Err(ProvisionError::config(format!(
                    "Refusing to delete resource group '{}' without --yes",
                    settings.deployment.resource_group
                )));
            }
            let resource_group = settings.deployment.resource_group.clone();
            build_engine(config, settings).teardown().await?;
            println!("Resource group '{}' deleted", resource_group);
            Ok(())
        }
    }
}

fn build_engine(
    config: &CliConfig,
    settings: ProvisionSettings,
) -> ProvisionEngine<ArmClient<impl vm_provision::core::TokenCredential>> {
    let client = ArmClient::new(&settings.arm_endpoint, default_credential()).with_poll_settings(
        PollSettings {
            interval: settings.poll_interval,
            timeout: settings.timeout,
        },
    );
    let provisioner = Provisioner::new(client, &settings.subscription_id, settings.deployment);
    ProvisionEngine::new_with_monitoring(provisioner, config.timings)
}

fn fail(e: &ProvisionError) -> ! {
    // 記錄詳細錯誤信息
    tracing::error!(
        "❌ Provisioning failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 Suggestion: {}", e.recovery_suggestion());

    std::process::exit(e.exit_code())
}
