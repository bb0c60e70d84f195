//! The fixed error vocabulary of the syscall boundary. The names go
//! over the wire verbatim; richer internal errors are collapsed into
//! the nearest of these before a reply leaves the kernel.

use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Errno {
    /// Path or PID not found.
    #[error("ENOENT")]
    Enoent,
    /// Malformed arguments.
    #[error("EINVAL")]
    Einval,
    /// Unrecognised command or request.
    #[error("ENOSYS")]
    Enosys,
    /// FD absent or lacking the required capability.
    #[error("EBADF")]
    Ebadf,
}

impl Errno {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enoent => "ENOENT",
            Self::Einval => "EINVAL",
            Self::Enosys => "ENOSYS",
            Self::Ebadf => "EBADF",
        }
    }
}

impl FromStr for Errno {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ENOENT" => Ok(Self::Enoent),
            "EINVAL" => Ok(Self::Einval),
            "ENOSYS" => Ok(Self::Enosys),
            "EBADF" => Ok(Self::Ebadf),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip() {
        for errno in [Errno::Enoent, Errno::Einval, Errno::Enosys, Errno::Ebadf] {
            assert_eq!(errno.as_str().parse::<Errno>(), Ok(errno));
            assert_eq!(errno.to_string(), errno.as_str());
        }
    }
}
