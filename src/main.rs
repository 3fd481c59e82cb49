// Entrypoint for the CLI application.
// - Keeps `main` small: read the configuration, build the API client, and
//   hand it to the UI loop.
// - Environment access happens only here; everything below receives values.

use labelops_cli::{
    api::{ApiClient, Config},
    ui::main_menu,
};

fn main() -> anyhow::Result<()> {
    // `LABELOPS_BASE_URL` (defaulted) and `LABELOPS_API_KEY` (required).
    let config = Config::from_env()?;
    let api = ApiClient::new(config)?;

    // Start the interactive menu. This call blocks until the user exits.
    main_menu(api)?;
    Ok(())
}
