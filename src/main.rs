use log::*;

use pollbox::config::Settings;
use pollbox::store::PostgresStore;
use pollbox::templates::Templates;
use pollbox::AppState;

fn startup_error(err: impl std::error::Error + Send + Sync + 'static) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, err)
}

#[async_std::main]
async fn main() -> Result<(), std::io::Error> {
    pretty_env_logger::init();

    let settings = Settings::from_env().map_err(|err| {
        error!("Invalid configuration: {}", err);
        startup_error(err)
    })?;

    match PostgresStore::connect(&settings).await {
        Ok(store) => {
            store.migrate().await.map_err(|err| {
                error!("Could not migrate the database! {:?}", err);
                startup_error(err)
            })?;

            let templates = Templates::new().map_err(|err| {
                error!("Could not load the templates! {:?}", err);
                startup_error(err)
            })?;

            let app = pollbox::app(AppState::new(store, templates));
            info!("Listening on {}", settings.listen_addr);
            app.listen(settings.listen_addr).await?;
            Ok(())
        }
        Err(err) => {
            error!("Could not initialize pool! {:?}", err);
            Err(startup_error(err))
        }
    }
}
