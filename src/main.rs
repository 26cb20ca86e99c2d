use std::env;
use std::error::Error;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use softimg::appliance::{
    self, deploy, ApplianceError, ApplianceSession, DeployRequest, DeployState, RestSession,
};
use softimg::config::DeviceConfig;
use softimg::metadata::image_info;
use softimg::IsoImage;

const USAGE: &str = "\
Usage: softimg [--config <file>] <command> [args]

Commands:
  info <image>              Show volume and product information
  cat <image> <path>        Write one file from the image to stdout
  list                      List images and boot volumes on the appliance
  upload <image>            Upload an image to the appliance
  install <image> <volume>  Install an image onto a boot volume
  activate <volume>         Boot the appliance from a volume
  delete <name>             Delete an image from the appliance

Options:
  --config <file>           Device configuration (JSON)
  --create-volume           Let install create a missing volume
  --force                   Redo work that appears done already";

fn main() {
    let mut args: Vec<String> = env::args().skip(1).collect();

    let mut config_path: Option<PathBuf> = None;
    if let Some(index) = args.iter().position(|arg| arg == "--config") {
        if index + 1 < args.len() {
            args.remove(index);
            config_path = Some(PathBuf::from(args.remove(index)));
        } else {
            eprintln!("ERROR: --config flag requires an argument.");
            std::process::exit(1);
        }
    }
    let force = take_flag(&mut args, "--force");
    let create_volume = take_flag(&mut args, "--create-volume");

    if args.is_empty() {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    }
    let command = args[0].as_str();
    let rest = &args[1..];
    let config = config_path.as_deref();

    let result = match (command, rest) {
        ("info", [image]) => cmd_info(Path::new(image)),
        ("cat", [image, path]) => cmd_cat(Path::new(image), path),
        ("list", []) => cmd_list(config),
        ("upload", [image]) => cmd_upload(config, image, force),
        ("install", [image, volume]) => cmd_install(config, image, volume, create_volume, force),
        ("activate", [volume]) => cmd_activate(config, volume),
        ("delete", [name]) => cmd_delete(config, name),
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("ERROR: {}", e);
        std::process::exit(1);
    }
}

fn take_flag(args: &mut Vec<String>, flag: &str) -> bool {
    if let Some(index) = args.iter().position(|arg| arg == flag) {
        args.remove(index);
        true
    } else {
        false
    }
}

fn connect(config_path: Option<&Path>) -> Result<RestSession, Box<dyn Error>> {
    let config = DeviceConfig::load(config_path)?;
    Ok(RestSession::new(&config)?)
}

fn cmd_info(image_path: &Path) -> Result<(), Box<dyn Error>> {
    let image = IsoImage::open(image_path)?;
    let volume = image.volume();
    println!("Image: {}", image_path.display());
    println!("  Volume:  {}", volume.volume_identifier);
    println!(
        "  Size:    {} blocks of {} bytes",
        volume.volume_space_size, volume.logical_block_size
    );

    let info = image_info(&image)?;
    println!("Product:");
    println!("  Name:    {}", info.product);
    println!("  Version: {}", info.version);
    println!("  Build:   {}", info.build);
    Ok(())
}

fn cmd_cat(image_path: &Path, file_path: &str) -> Result<(), Box<dyn Error>> {
    let image = IsoImage::open(image_path)?;
    let bytes = image.get_file(file_path)?;
    io::stdout().write_all(&bytes)?;
    Ok(())
}

fn cmd_list(config_path: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let session = connect(config_path)?;
    println!("Images:");
    for image in session.list_images()? {
        println!(
            "  {}  {} {} build {}",
            image.name, image.product, image.version, image.build
        );
    }
    println!("Volumes:");
    for volume in session.volumes()? {
        let marker = if volume.active { "  [active]" } else { "" };
        println!(
            "  {}  {} {} build {}{}",
            volume.name, volume.product, volume.version, volume.build, marker
        );
    }
    Ok(())
}

fn cmd_upload(config_path: Option<&Path>, image: &str, force: bool) -> Result<(), Box<dyn Error>> {
    let session = connect(config_path)?;
    let request = DeployRequest {
        image_path: PathBuf::from(image),
        state: DeployState::Present,
        volume: None,
        create_volume: false,
        force,
    };
    if appliance::ensure(&session, &request)? {
        println!("Uploaded {}.", image);
    } else {
        println!("{} is already on the appliance.", image);
    }
    Ok(())
}

fn cmd_install(
    config_path: Option<&Path>,
    image: &str,
    volume: &str,
    create_volume: bool,
    force: bool,
) -> Result<(), Box<dyn Error>> {
    let session = connect(config_path)?;
    let request = DeployRequest {
        image_path: PathBuf::from(image),
        state: DeployState::Installed,
        volume: Some(volume.to_string()),
        create_volume,
        force,
    };
    if appliance::ensure(&session, &request)? {
        println!("Installed {} onto {}.", image, volume);
    } else {
        println!("Volume {} is already current.", volume);
    }
    Ok(())
}

fn cmd_activate(config_path: Option<&Path>, volume: &str) -> Result<(), Box<dyn Error>> {
    let session = connect(config_path)?;
    let known = session
        .volumes()?
        .iter()
        .any(|candidate| candidate.name == volume);
    if !known {
        return Err(Box::new(ApplianceError::NoVolume(volume.to_string())));
    }
    session.activate_volume(volume)?;
    deploy::wait_for_active(&session, volume, deploy::DEFAULT_ATTEMPTS)?;
    println!("Volume {} is active.", volume);
    Ok(())
}

fn cmd_delete(config_path: Option<&Path>, name: &str) -> Result<(), Box<dyn Error>> {
    let session = connect(config_path)?;
    let request = DeployRequest {
        image_path: PathBuf::from(name),
        state: DeployState::Absent,
        volume: None,
        create_volume: false,
        force: false,
    };
    if appliance::ensure(&session, &request)? {
        println!("Deleted {}.", name);
    } else {
        println!("{} is not on the appliance.", name);
    }
    Ok(())
}
