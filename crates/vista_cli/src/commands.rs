//! Command implementations

use std::path::PathBuf;
use std::sync::Arc;

use vista_core::SceneResult;
use vista_scene::NodeKind;
use vista_services::{
    CameraPosition, LoopbackServer, SceneServer, SceneService, ServiceConfig, SyncResult,
};

use crate::render;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Inspect { file: PathBuf },
    Create { name: String, file: PathBuf },
    Convert { input: PathBuf, output: PathBuf },
    SyncDemo,
}

pub async fn run(command: Command, config: ServiceConfig) -> SceneResult<()> {
    match command {
        Command::Inspect { file } => inspect(file, config),
        Command::Create { name, file } => create(&name, file, config),
        Command::Convert { input, output } => convert(input, output, config).await,
        Command::SyncDemo => sync_demo(config).await,
    }
}

fn inspect(file: PathBuf, config: ServiceConfig) -> SceneResult<()> {
    let mut service = SceneService::new(config);
    service.load_from_file(&file)?;
    print!("{}", render::tree(service.tree()?));
    Ok(())
}

fn create(name: &str, file: PathBuf, config: ServiceConfig) -> SceneResult<()> {
    let mut service = SceneService::new(config);
    let root = service.create_in_file(name, &file)?;
    println!("Created scene '{}' ({}) in {}", name, root, file.display());
    Ok(())
}

/// Load one file and write it to another; the loaded file is left alone
async fn convert(input: PathBuf, output: PathBuf, config: ServiceConfig) -> SceneResult<()> {
    let mut service = SceneService::new(config);
    service.load_from_file(&input)?;
    service.save_to_file(&output)?;
    let nodes = service.tree()?.len();
    service.release().await?;
    println!("Wrote {} node(s) from {} to {}", nodes, input.display(), output.display());
    Ok(())
}

/// Two collaborators on an in-process server trade a camera and a message
async fn sync_demo(config: ServiceConfig) -> SceneResult<()> {
    let server = LoopbackServer::new();

    let mut alice = SceneService::new(with_user(&config, "alice"));
    alice.login(Arc::new(server.clone())).await?;
    let root = alice.create_in_server("Demo", "demo").await?;
    alice.edit(|tree| {
        tree.create_node(
            root,
            NodeKind::PointCloud,
            None,
            Some("https://models.example.com/Melbourne.uds"),
        )
    })?;
    alice.save().await?;

    let scene_id = match alice.load_source() {
        Some(vista_services::LoadSource::Server { scene_id, .. }) => scene_id.clone(),
        _ => return Err(vista_core::SceneError::not_found("demo scene")),
    };

    let mut bob = SceneService::new(with_user(&config, "bob"));
    let shared: Arc<dyn SceneServer> = Arc::new(server.clone());
    bob.login(shared).await?;
    bob.load_from_server(&scene_id, "demo").await?;
    let bob_session = match bob.collaboration() {
        Some(collab) => collab.session_id().clone(),
        None => return Err(vista_core::SceneError::NotInitialized("bob".to_string())),
    };

    if let Some(collab) = alice.collaboration_mut() {
        collab.set_camera_positions(vec![CameraPosition::new([144.96, -37.81, 350.0], 0.0, -0.6)])?;
        collab.queue_message(bob_session, "greeting", "hello from alice")?;
    }
    alice.tick(true).await?;

    if let SyncResult::Synced { users, received, .. } = bob.tick(true).await? {
        println!("bob sees {} other user(s) and got {} message(s)", users, received);
    }
    if let Some(collab) = bob.collaboration_mut() {
        for user in collab.users() {
            for camera in &user.camera_positions {
                println!(
                    "  {} camera at ({:.2}, {:.2}, {:.1})",
                    user.user_name, camera.x, camera.y, camera.z
                );
            }
        }
        for message in collab.take_received_messages() {
            println!("  [{}] {}", message.message_type, message.payload);
        }
    }
    print!("{}", render::tree(bob.tree()?));

    bob.release().await?;
    alice.release().await?;
    Ok(())
}

fn with_user(config: &ServiceConfig, user: &str) -> ServiceConfig {
    let mut config = config.clone();
    config.server.user_name = user.to_string();
    config
}
