//! Configuration data: the value tree and everything that produces it.
//!
//! Local sources are layered with key-by-key merging:
//! 1. **Defaults** - `default.<ext>` in the config directory (required)
//! 2. **Environment** - `<environment>.<ext>` (optional)
//! 3. **Remote** - each registered resolver's bulk payload, in registration order
//!
//! ## Merge Strategy
//! - Mappings merge key by key, later layers winning
//! - Arrays and scalars are replaced wholesale
//! - Placeholders and deferred values stay in the tree until resolved
//!
//! ## Settings
//! - `CONFIG_PATH` - Config directory (default: first of `config/`, `{src,lib,main,dist,app}/config/`)
//! - `CONFIG_ENV` - Environment name (default: `development`)
//! - `<RESOLVER>_<OPTION>` - Resolver options, e.g. `CONSUL_ADDRESS`

pub mod loader;
pub mod merge;
pub mod placeholder;
pub mod schema;
pub mod settings;
pub mod translator;
pub mod value;

pub use loader::{ConfigLoader, FileLoader, JsonLoader, LoaderSet, YamlLoader, locate_config_dir};
pub use merge::{deep_merge_json, merge, merge_all};
pub use placeholder::{ExpectedType, PlaceholderSpec};
pub use schema::{BasicValidator, SchemaValidator};
pub use settings::Settings;
pub use translator::{EnvInterpolation, FnTranslator, Translator};
pub use value::{ConfigValue, Deferred, Lookup, Primitive, RawValue, Source, split_path};
