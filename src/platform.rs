/// Instructions for letting an unprivileged user send ICMP echo requests.
pub fn raw_socket_guidance() -> &'static str {
    #[cfg(windows)]
    const GUIDANCE: &str = "run pingstats from an elevated (Administrator) prompt";

    #[cfg(target_os = "linux")]
    const GUIDANCE: &str = "allow unprivileged ICMP with \
`sysctl -w net.ipv4.ping_group_range=\"0 2147483647\"`, \
or grant the binary CAP_NET_RAW with `setcap cap_net_raw+ep $(which pingstats)`";

    #[cfg(all(unix, not(target_os = "linux")))]
    const GUIDANCE: &str = "run pingstats as root or with sudo";

    #[cfg(not(any(unix, windows)))]
    const GUIDANCE: &str = "run pingstats with privileges to open ICMP sockets";

    GUIDANCE
}

pub fn log_platform_guidance() {
    tracing::info!(
        guidance = raw_socket_guidance(),
        "ICMP echo may need extra privileges on this platform"
    );
}
