// IPv4 multicast socket setup shared by the CoAP listener and mDNS engine.

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

/// Bind `0.0.0.0:port` with address reuse and join `group` on `interface`.
///
/// Reuse is required because other home-automation software on the same
/// host commonly holds 5353 and 5683 already.
pub(crate) fn bind_multicast(
    group: Ipv4Addr,
    port: u16,
    interface: Ipv4Addr,
) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;
    socket.set_multicast_loop_v4(true)?;
    socket.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into())?;
    socket.join_multicast_v4(&group, &interface)?;

    UdpSocket::from_std(socket.into())
}
