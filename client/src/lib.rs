pub mod app;
pub mod config;
pub mod grid;
pub mod state;

use winit::event_loop::EventLoop;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

use app::App;
use config::ClientConfig;

pub fn run() -> anyhow::Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        env_logger::init();
    }
    #[cfg(target_arch = "wasm32")]
    {
        console_log::init_with_level(log::Level::Info)?;
    }

    let config = ClientConfig::from_env();
    log::info!(
        "Starting grid (api: {}, proxy: {})",
        config.api_base,
        config.proxy_base
    );

    let event_loop = EventLoop::with_user_event().build()?;
    let mut app = App::new(
        config,
        #[cfg(target_arch = "wasm32")]
        &event_loop,
    );
    event_loop.run_app(&mut app)?;

    Ok(())
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn run_web() -> Result<(), wasm_bindgen::JsValue> {
    console_error_panic_hook::set_once();
    run().map_err(|e| wasm_bindgen::JsValue::from_str(&e.to_string()))?;

    Ok(())
}
