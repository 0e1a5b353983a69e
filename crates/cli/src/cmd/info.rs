use std::path::Path;

use mason_lib::consts::DEFAULT_GO_VERSION;
use mason_lib::platform::BuildTarget;
use mason_lib::source::GitBlueprint;

pub fn cmd_info(cache_root: &Path) {
  let blueprint = GitBlueprint::openbazaar_daemon();

  println!("System:");
  match BuildTarget::current() {
    Some(target) => {
      println!("Target: {}", target);
      println!("Binary: {}", target.binary_filename(blueprint.binary_prefix()));
    }
    None => println!("Could not detect a supported build target."),
  }
  println!("Source: {}", blueprint.url());
  println!("Go: {}", DEFAULT_GO_VERSION);
  println!("Cache: {}", cache_root.display());
}
