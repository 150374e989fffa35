//! ngbuild daemon: discovers apps, serves the shared HTTP boundary and
//! shuts everything down on the first termination signal.

use ngbuild::{get_apps, integrations, ngbuild_directory};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!(",.-~*´¨¯¨`*·~-.¸-(_NGBuild_)-,.-~*´¨¯¨`*·~-.¸");
    println!("   Building your dreams, one step at a time\n");

    println!("Available Integrations:");
    for integration in integrations(&[]) {
        println!("    {}", integration.identifier());
    }

    let apps = get_apps();
    if apps.is_empty() {
        eprintln!(
            "You have no configured apps, or we can't find your apps directory\n\
             To create an app, create an apps/ directory in your ngbuild directory \
             and create subdirectories per app"
        );
        std::process::exit(1);
    }

    println!("Apps:");
    for app in &apps {
        println!("    {}", app.name());
    }

    let root = ngbuild_directory()?;
    let mut server = tokio::spawn(ngbuild::http::serve(root));

    tokio::select! {
        _ = wait_for_shutdown_signal() => {}
        result = &mut server => {
            if let Ok(Err(err)) = result {
                eprintln!("{err}");
            }
        }
    }

    println!("Thank you for choosing ngbuild, goodbye.");
    server.abort();
    for app in &apps {
        app.shutdown().await;
    }
    for integration in integrations(&[]) {
        integration.shutdown();
    }

    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
