//! End-to-end flows over in-process sockets

mod friends_test;
mod media_test;
mod messaging_test;
mod realtime_test;
