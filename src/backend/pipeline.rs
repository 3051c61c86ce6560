// Graphics pipeline creation
//
// One render pass with a single color attachment, one fixed-function
// pipeline, one framebuffer per swapchain image view. All of it is built
// once and never recreated.

use super::error::{RendererResult, VkResultExt};
use super::release::ReleaseStack;
use super::shader;
use super::swapchain::Swapchain;
use ash::vk;
use std::path::Path;

/// Render pass, pipeline and the per-image framebuffers.
///
/// `framebuffers[i]` wraps `image_views[i]` of the swapchain it was built from.
#[derive(Clone, Debug)]
pub struct PipelineArtifacts {
    pub render_pass: vk::RenderPass,
    pub pipeline: vk::Pipeline,
    pub framebuffers: Vec<vk::Framebuffer>,
}

/// Paths of the two precompiled shader blobs.
#[derive(Clone, Copy, Debug)]
pub struct ShaderPaths<'a> {
    pub vertex: &'a Path,
    pub fragment: &'a Path,
}

impl PipelineArtifacts {
    pub fn new(
        device: &ash::Device,
        swapchain: &Swapchain,
        shaders: ShaderPaths<'_>,
        resources: &mut ReleaseStack,
    ) -> RendererResult<Self> {
        let render_pass = create_render_pass(device, swapchain.format)?;
        let doomed = device.clone();
        resources.push("render pass", move || unsafe {
            doomed.destroy_render_pass(render_pass, None);
        });

        // Empty layout: no descriptor sets, no push constants.
        let layout_info = vk::PipelineLayoutCreateInfo::builder();
        let pipeline_layout = unsafe { device.create_pipeline_layout(&layout_info, None) }
            .creating("pipeline layout")?;
        let doomed = device.clone();
        resources.push("pipeline layout", move || unsafe {
            doomed.destroy_pipeline_layout(pipeline_layout, None);
        });

        let pipeline = create_graphics_pipeline(
            device,
            render_pass,
            pipeline_layout,
            swapchain.extent,
            shaders,
        )?;
        let doomed = device.clone();
        resources.push("graphics pipeline", move || unsafe {
            doomed.destroy_pipeline(pipeline, None);
        });

        log::info!("Built graphics pipeline");

        let framebuffers = create_framebuffers(
            device,
            &swapchain.image_views,
            render_pass,
            swapchain.extent,
            resources,
        )?;

        Ok(Self {
            render_pass,
            pipeline,
            framebuffers,
        })
    }
}

/// Create the render pass: one color attachment, one subpass.
pub fn create_render_pass(device: &ash::Device, format: vk::Format) -> RendererResult<vk::RenderPass> {
    // Color attachment (the swapchain image)
    let color_attachment = vk::AttachmentDescription::builder()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .build();

    let color_attachment_ref = vk::AttachmentReference::builder()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .build();

    let color_attachments = &[color_attachment_ref];
    let subpass = vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(color_attachments)
        .build();

    // The first write waits for whatever last touched the image outside the pass.
    let dependency = vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        )
        .build();

    let attachments = &[color_attachment];
    let subpasses = &[subpass];
    let dependencies = &[dependency];

    let render_pass_info = vk::RenderPassCreateInfo::builder()
        .attachments(attachments)
        .subpasses(subpasses)
        .dependencies(dependencies);

    unsafe { device.create_render_pass(&render_pass_info, None) }.creating("render pass")
}

/// Build the one graphics pipeline.
///
/// The shader modules only live for the duration of this call.
pub fn create_graphics_pipeline(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    pipeline_layout: vk::PipelineLayout,
    extent: vk::Extent2D,
    shaders: ShaderPaths<'_>,
) -> RendererResult<vk::Pipeline> {
    let vert_code = shader::read_spirv(shaders.vertex)?;
    let frag_code = shader::read_spirv(shaders.fragment)?;

    let mut modules = ReleaseStack::new();
    let vert_shader = shader::create_shader_module(device, &vert_code)?;
    let doomed = device.clone();
    modules.push("vertex shader module", move || unsafe {
        doomed.destroy_shader_module(vert_shader, None);
    });
    let frag_shader = shader::create_shader_module(device, &frag_code)?;
    let doomed = device.clone();
    modules.push("fragment shader module", move || unsafe {
        doomed.destroy_shader_module(frag_shader, None);
    });

    let entry_point = c"main";

    let vert_stage = vk::PipelineShaderStageCreateInfo::builder()
        .stage(vk::ShaderStageFlags::VERTEX)
        .module(vert_shader)
        .name(entry_point)
        .build();

    let frag_stage = vk::PipelineShaderStageCreateInfo::builder()
        .stage(vk::ShaderStageFlags::FRAGMENT)
        .module(frag_shader)
        .name(entry_point)
        .build();

    let shader_stages = &[vert_stage, frag_stage];

    // No vertex input: the vertex shader generates the triangle itself
    let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder();

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false);

    let viewport = vk::Viewport::builder()
        .x(0.0)
        .y(0.0)
        .width(extent.width as f32)
        .height(extent.height as f32)
        .min_depth(0.0)
        .max_depth(1.0)
        .build();

    let scissor = vk::Rect2D::builder()
        .offset(vk::Offset2D { x: 0, y: 0 })
        .extent(extent)
        .build();

    let viewports = &[viewport];
    let scissors = &[scissor];
    let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
        .viewports(viewports)
        .scissors(scissors);

    let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::BACK)
        .front_face(vk::FrontFace::CLOCKWISE)
        .depth_bias_enable(false);

    let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    // Straight overwrite
    let color_blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(false)
        .build();

    let color_blend_attachments = &[color_blend_attachment];
    let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
        .logic_op_enable(false)
        .logic_op(vk::LogicOp::COPY)
        .attachments(color_blend_attachments)
        .blend_constants([0.0; 4]);

    let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
        .stages(shader_stages)
        .vertex_input_state(&vertex_input_info)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterizer)
        .multisample_state(&multisampling)
        .color_blend_state(&color_blending)
        .layout(pipeline_layout)
        .render_pass(render_pass)
        .subpass(0)
        .build();

    let pipelines = unsafe {
        device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
    }
    .map_err(|(_, e)| e)
    .creating("graphics pipeline")?;

    modules.release_all();

    Ok(pipelines[0])
}

/// Create one framebuffer per swapchain image view, in view order.
pub fn create_framebuffers(
    device: &ash::Device,
    image_views: &[vk::ImageView],
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
    resources: &mut ReleaseStack,
) -> RendererResult<Vec<vk::Framebuffer>> {
    let mut framebuffers = Vec::with_capacity(image_views.len());

    for image_view in image_views {
        let framebuffer_info =
            framebuffer_info(render_pass, std::slice::from_ref(image_view), extent);

        let framebuffer = unsafe { device.create_framebuffer(&framebuffer_info, None) }
            .creating("framebuffer")?;
        let doomed = device.clone();
        resources.push("framebuffer", move || unsafe {
            doomed.destroy_framebuffer(framebuffer, None);
        });
        framebuffers.push(framebuffer);
    }

    Ok(framebuffers)
}

/// Framebuffer over `attachments` at the full swapchain extent.
fn framebuffer_info(
    render_pass: vk::RenderPass,
    attachments: &[vk::ImageView],
    extent: vk::Extent2D,
) -> vk::FramebufferCreateInfoBuilder<'_> {
    vk::FramebufferCreateInfo::builder()
        .render_pass(render_pass)
        .attachments(attachments)
        .width(extent.width)
        .height(extent.height)
        .layers(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn framebuffer_i_wraps_image_view_i() {
        let render_pass = vk::RenderPass::from_raw(5);
        let views: Vec<_> = (20..23).map(vk::ImageView::from_raw).collect();
        let extent = vk::Extent2D { width: 800, height: 600 };

        for (i, view) in views.iter().enumerate() {
            let info = framebuffer_info(render_pass, std::slice::from_ref(view), extent);

            assert_eq!(info.render_pass, render_pass);
            assert_eq!(info.attachment_count, 1);
            let attached = unsafe { std::slice::from_raw_parts(info.p_attachments, 1) };
            assert_eq!(attached, &[views[i]]);
            assert_eq!((info.width, info.height, info.layers), (800, 600, 1));
        }
    }
}
