use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = kb_api::Args::parse();
	kb_api::run(args).await
}
