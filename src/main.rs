use anyhow::Result;
use repo_util::App;
use repo_util::Config;
use repo_util::cli::build_command;
use repo_util::cli::parse_invocation;
use repo_util::clients::AnyProvider;
use repo_util::descriptor::descriptors;
use repo_util::logging;

#[tokio::main]
async fn main() -> Result<()> {
    let descriptors = descriptors();
    let matches = build_command(&descriptors).get_matches();
    let (invocation, options) = parse_invocation(&descriptors, &matches)?;
    logging::init(options.log_level)?;

    let config = Config::load()?;
    let provider = AnyProvider::from_config(&config, options.cache).await?;
    let app = App::new(provider, descriptors);

    app.run(
        invocation,
        &options,
        &mut std::io::stdout(),
        &mut std::io::stderr(),
    )
    .await
}
