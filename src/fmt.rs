//! Logging facade: `defmt` on the device, the `log` crate everywhere else.
//!
//! Format strings must stay within the subset both backends accept
//! (`{}` and `{:?}`).

#![macro_use]
#![allow(unused_macros)]

#[collapse_debuginfo(yes)]
macro_rules! trace {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            cfg_if::cfg_if! {
                if #[cfg(target_os = "none")] {
                    ::defmt::trace!($s $(, $x)*);
                } else {
                    ::log::trace!($s $(, $x)*);
                }
            }
        }
    };
}

#[collapse_debuginfo(yes)]
macro_rules! debug {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            cfg_if::cfg_if! {
                if #[cfg(target_os = "none")] {
                    ::defmt::debug!($s $(, $x)*);
                } else {
                    ::log::debug!($s $(, $x)*);
                }
            }
        }
    };
}

#[collapse_debuginfo(yes)]
macro_rules! info {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            cfg_if::cfg_if! {
                if #[cfg(target_os = "none")] {
                    ::defmt::info!($s $(, $x)*);
                } else {
                    ::log::info!($s $(, $x)*);
                }
            }
        }
    };
}

#[collapse_debuginfo(yes)]
macro_rules! warn {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            cfg_if::cfg_if! {
                if #[cfg(target_os = "none")] {
                    ::defmt::warn!($s $(, $x)*);
                } else {
                    ::log::warn!($s $(, $x)*);
                }
            }
        }
    };
}

#[collapse_debuginfo(yes)]
macro_rules! error {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            cfg_if::cfg_if! {
                if #[cfg(target_os = "none")] {
                    ::defmt::error!($s $(, $x)*);
                } else {
                    ::log::error!($s $(, $x)*);
                }
            }
        }
    };
}
