//! The `glimpse tools` command: which backends will handle which files.

use glimpse_core::processor::{Capabilities, ToolProbe};
use glimpse_core::{Config, ProcessorFactory};

pub async fn execute(config: Config) -> anyhow::Result<()> {
    let status = ToolProbe::probe(&config.external_tool).await;
    println!(
        "External tool: {} {}",
        config.external_tool.program,
        status.version_display()
    );
    if !config.external_tool.enabled {
        println!("  (disabled in config)");
    }

    let factory = ProcessorFactory::from_config(&config, status);
    println!("\nProcessors (in routing order):");
    for processor in factory.processors() {
        println!(
            "  {:<8} [{}]\n           {}",
            processor.name(),
            describe(processor.capabilities()),
            processor.supported_extensions().join(" ")
        );
    }
    Ok(())
}

fn describe(caps: Capabilities) -> String {
    [
        (caps.thumbnails, "thumbnails"),
        (caps.content_hash, "hash"),
        (caps.crop, "crop"),
        (caps.transform, "export"),
    ]
    .iter()
    .filter(|(on, _)| *on)
    .map(|(_, name)| *name)
    .collect::<Vec<_>>()
    .join(", ")
}
