// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// spoolwerk-monitor — port monitors and port I/O.
//
// Loads monitor plugins (built-in or shared libraries), keeps them
// reference-counted in a `MonitorRegistry`, and opens ports either through
// the owning monitor or through one of the in-layer device backends.

pub mod abi;
pub mod device;
pub mod localmon;
pub mod localui;
pub mod module;
pub mod port;
pub mod registry;

pub use abi::{Generation, MonitorTable, MonitorUi, XcvChannel};
pub use module::{BuiltinCatalog, DefaultLoader, DylibLoader, ModuleLoader, PluginModule};
pub use port::{DeviceConfig, PortClass, PortDispatch, PortSession, PortSink};
pub use registry::{Monitor, MonitorRef, MonitorRegistry, XcvSession};
