// Backend module - Vulkan abstraction layer
//
// One file per bootstrap stage, in dependency order:
// instance -> device -> swapchain -> pipeline -> commands -> sync.
// Every created object registers its destroy call on a ReleaseStack.

pub mod commands;
pub mod device;
pub mod error;
pub mod instance;
pub mod pipeline;
pub mod release;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use device::VulkanDevice;
pub use error::RendererResult;
pub use instance::VulkanInstance;
pub use release::ReleaseStack;
pub use swapchain::Swapchain;
