//! Syscall ingress: decode loosely-typed wire payloads into the
//! kernel's sum type. A missing or mistyped field is EINVAL, an
//! unknown `cmd` or ioctl request is ENOSYS. The `write` payload's
//! bytes arrive in the event's binary sidecar, not the JSON.

use core_sys::Errno;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoctlRequest {
    GetFlags,
    SetFlags,
}

#[derive(Debug, PartialEq)]
pub enum Syscall {
    Open {
        path: String,
    },
    Close {
        fd: i32,
    },
    Read {
        fd: i32,
        length: usize,
    },
    Write {
        fd: i32,
        data: Vec<u8>,
    },
    Ioctl {
        fd: i32,
        request: IoctlRequest,
        value: Option<u32>,
    },
    Stat {
        path: String,
    },
    Fstat {
        fd: i32,
    },
    Chdir {
        path: String,
    },
    Getwd,
    Readdir {
        path: String,
    },
    Dial {
        network: String,
        address: String,
        timeout_ns: u64,
    },
    Spawn {
        argv: Vec<String>,
        fds: Vec<i32>,
    },
    Wait {
        pid: i32,
    },
    Exit {
        code: i32,
    },
    Sysctl {
        name: String,
        value: Option<String>,
    },
}

/// Decode one event. The id comes back even on failure so the error
/// reply still correlates.
pub fn decode(payload: &Value, data: Option<Vec<u8>>) -> Result<(u64, Syscall), (u64, Errno)> {
    let id = payload.get("id").and_then(Value::as_u64).unwrap_or(0);
    let call = decode_call(payload, data).map_err(|errno| (id, errno))?;
    Ok((id, call))
}

fn decode_call(payload: &Value, data: Option<Vec<u8>>) -> Result<Syscall, Errno> {
    let cmd = payload
        .get("cmd")
        .and_then(Value::as_str)
        .ok_or(Errno::Einval)?;

    let call = match cmd {
        "open" => Syscall::Open {
            path: string_field(payload, "path")?,
        },
        "close" => Syscall::Close {
            fd: int_field(payload, "fd")?,
        },
        "read" => Syscall::Read {
            fd: int_field(payload, "fd")?,
            length: payload
                .get("length")
                .and_then(Value::as_u64)
                .ok_or(Errno::Einval)? as usize,
        },
        "write" => {
            let data = data.ok_or(Errno::Einval)?;
            let offset = payload
                .get("offset")
                .and_then(Value::as_u64)
                .ok_or(Errno::Einval)? as usize;
            let length = payload
                .get("length")
                .and_then(Value::as_u64)
                .ok_or(Errno::Einval)? as usize;
            let end = offset.checked_add(length).ok_or(Errno::Einval)?;
            if end > data.len() {
                return Err(Errno::Einval);
            }
            Syscall::Write {
                fd: int_field(payload, "fd")?,
                data: data[offset..end].to_vec(),
            }
        }
        "ioctl" => {
            let request = match payload.get("request").and_then(Value::as_str) {
                Some("GetFlags") => IoctlRequest::GetFlags,
                Some("SetFlags") => IoctlRequest::SetFlags,
                Some(_) => return Err(Errno::Enosys),
                None => return Err(Errno::Einval),
            };
            Syscall::Ioctl {
                fd: int_field(payload, "fd")?,
                request,
                value: payload.get("value").and_then(Value::as_u64).map(|v| v as u32),
            }
        }
        "stat" => Syscall::Stat {
            path: string_field(payload, "path")?,
        },
        "fstat" => Syscall::Fstat {
            fd: int_field(payload, "fd")?,
        },
        "chdir" => Syscall::Chdir {
            path: string_field(payload, "path")?,
        },
        "getwd" => Syscall::Getwd,
        "readdir" => Syscall::Readdir {
            path: string_field(payload, "path")?,
        },
        "dial" => Syscall::Dial {
            network: string_field(payload, "network")?,
            address: string_field(payload, "address")?,
            timeout_ns: payload.get("timeout").and_then(Value::as_u64).unwrap_or(0),
        },
        "spawn" => {
            let argv = payload
                .get("argv")
                .and_then(Value::as_array)
                .ok_or(Errno::Einval)?
                .iter()
                .map(|v| v.as_str().map(str::to_string).ok_or(Errno::Einval))
                .collect::<Result<Vec<_>, _>>()?;
            if argv.is_empty() {
                return Err(Errno::Einval);
            }
            let fds = payload
                .get("fds")
                .and_then(Value::as_array)
                .map(|list| {
                    list.iter()
                        .map(|v| {
                            v.as_i64()
                                .filter(|fd| *fd >= 0)
                                .map(|fd| fd as i32)
                                .ok_or(Errno::Einval)
                        })
                        .collect::<Result<Vec<_>, _>>()
                })
                .transpose()?
                .unwrap_or_default();
            Syscall::Spawn { argv, fds }
        }
        "wait" => Syscall::Wait {
            pid: int_field(payload, "pid")?,
        },
        "exit" => Syscall::Exit {
            code: int_field(payload, "code")?,
        },
        "sysctl" => Syscall::Sysctl {
            name: string_field(payload, "name")?,
            value: payload
                .get("value")
                .and_then(Value::as_str)
                .map(str::to_string),
        },
        _ => return Err(Errno::Enosys),
    };
    Ok(call)
}

fn string_field(payload: &Value, field: &str) -> Result<String, Errno> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(Errno::Einval)
}

fn int_field(payload: &Value, field: &str) -> Result<i32, Errno> {
    payload
        .get(field)
        .and_then(Value::as_i64)
        .map(|v| v as i32)
        .ok_or(Errno::Einval)
}
