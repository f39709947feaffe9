// main.rs — 全景漫游窗口：菜单、状态栏、热点叠加与房间切换
//
// 用法: panorama_tour [FLOORPLAN.json] [--images DIR] [--config PATH]

#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")] // Release 下隐藏控制台

mod renderer;

use panorama_tour::config::arg_value;
use panorama_tour::{
    load_rooms, FallbackProvider, FileImageProvider, ImageProvider, NavigationEvent,
    PointerEvent, PointerId, ProjectedHotspot, Room, SyntheticImageProvider, Tour, ViewerConfig,
};
use renderer::Renderer;

use glam::Vec3;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use winit::{
    dpi::LogicalSize,
    event::*,
    event_loop::{ControlFlow, EventLoop},
    window::{Fullscreen, Window, WindowBuilder},
};

type HostTour = Tour<Box<dyn ImageProvider>>;

/// Actions raised by the egui layer, applied after the frame is drawn.
#[derive(Debug, Clone, PartialEq)]
enum UiAction {
    OpenFloorplan(PathBuf),
    OpenRoom(usize),
    Previous,
    Next,
    Refresh,
    ResetView,
    ToggleFullscreen,
    Exit,
}

/// Host-side state that is not part of the tour itself.
struct HostState {
    hotspots: Vec<ProjectedHotspot>,
    last_error: Option<String>,
    is_fullscreen: bool,
    // 鼠标位置（逻辑像素）
    cursor: (f32, f32),
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let config = ViewerConfig::resolve();
    let images_dir = arg_value(args.iter().cloned(), "--images").map(PathBuf::from);
    let floorplan = positional_arg(&args);

    let provider: Box<dyn ImageProvider> = match &images_dir {
        Some(dir) => {
            log::info!("loading panoramas from {}", dir.display());
            Box::new(FallbackProvider::new(
                FileImageProvider::new(dir, config.max_image_dimension),
                SyntheticImageProvider::default(),
            ))
        }
        None => Box::new(SyntheticImageProvider::default()),
    };

    let mut tour: HostTour = Tour::new(config, provider);
    let mut host = HostState {
        hotspots: Vec::new(),
        last_error: None,
        is_fullscreen: false,
        cursor: (0.0, 0.0),
    };

    let rooms = match floorplan.as_deref() {
        Some(path) => match load_rooms(path) {
            Ok(rooms) => rooms,
            Err(e) => {
                log::error!("cannot read {}: {e}", path.display());
                host.last_error = Some(e.to_string());
                demo_rooms()
            }
        },
        None => demo_rooms(),
    };
    tour.set_rooms(rooms);

    let event_loop = EventLoop::new();
    let window = match WindowBuilder::new()
        .with_title("Panorama Tour")
        .with_inner_size(LogicalSize::new(1280, 720))
        .build(&event_loop)
    {
        Ok(window) => Arc::new(window),
        Err(e) => {
            log::error!("cannot create window: {e}");
            return;
        }
    };

    let mut renderer = match pollster::block_on(Renderer::new(window.clone())) {
        Ok(renderer) => renderer,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    resize_tour(&mut tour, &window);

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Poll;

        // 取回后台加载结果
        for event in tour.pump() {
            match event {
                NavigationEvent::RoomChanged { index, room } => {
                    log::info!("entered room {} ({}) at index {index}", room.name, room.id);
                    host.last_error = None;
                    window.set_title(&format!("Panorama Tour - {}", room.name));
                }
                NavigationEvent::ImageLoadFailed { room, error, .. } => {
                    log::warn!("staying put, {} failed: {error}", room.id);
                    host.last_error = Some(error.to_string());
                }
            }
        }

        match event {
            Event::WindowEvent { event, .. } => {
                // 先让 egui 处理事件
                let response = renderer.egui_state.on_event(&renderer.egui_ctx, &event);
                if response.consumed {
                    return;
                }

                match event {
                    WindowEvent::CloseRequested => {
                        *control_flow = ControlFlow::Exit;
                    }

                    WindowEvent::Resized(new_size) => {
                        renderer.resize(new_size);
                        resize_tour(&mut tour, &window);
                    }

                    WindowEvent::ScaleFactorChanged { new_inner_size, .. } => {
                        renderer.resize(*new_inner_size);
                        resize_tour(&mut tour, &window);
                    }

                    // 键盘快捷键
                    WindowEvent::KeyboardInput { input, .. } => {
                        if input.state == ElementState::Pressed {
                            let action = match input.virtual_keycode {
                                Some(VirtualKeyCode::O) => pick_floorplan().map(UiAction::OpenFloorplan),
                                Some(VirtualKeyCode::Left) => Some(UiAction::Previous),
                                Some(VirtualKeyCode::Right) => Some(UiAction::Next),
                                Some(VirtualKeyCode::F5) => Some(UiAction::Refresh),
                                Some(VirtualKeyCode::R) => Some(UiAction::ResetView),
                                Some(VirtualKeyCode::F11) => Some(UiAction::ToggleFullscreen),
                                _ => None,
                            };
                            if let Some(action) = action {
                                apply_action(action, &mut tour, &mut host, &window, control_flow);
                            }
                        }
                    }

                    WindowEvent::MouseInput { state, button: MouseButton::Left, .. } => {
                        let (x, y) = host.cursor;
                        let event = match state {
                            ElementState::Pressed => PointerEvent::Down { id: PointerId::Mouse, x, y },
                            ElementState::Released => PointerEvent::Up { id: PointerId::Mouse },
                        };
                        if let Some(target) = tour.handle_pointer(event).followed {
                            log::debug!("hotspot click follows {target:?}");
                        }
                    }

                    WindowEvent::CursorMoved { position, .. } => {
                        let logical = position.to_logical::<f32>(window.scale_factor());
                        host.cursor = (logical.x, logical.y);
                        tour.handle_pointer(PointerEvent::Move {
                            id: PointerId::Mouse,
                            x: logical.x,
                            y: logical.y,
                        });
                    }

                    WindowEvent::CursorLeft { .. } => {
                        tour.handle_pointer(PointerEvent::Leave { id: PointerId::Mouse });
                    }

                    WindowEvent::MouseWheel { delta, .. } => {
                        // 与浏览器 deltaY 同向：向下滚动为正，一格约 100
                        let delta_y = match delta {
                            MouseScrollDelta::LineDelta(_, y) => -y * 100.0,
                            MouseScrollDelta::PixelDelta(pos) => -pos.y as f32,
                        };
                        tour.handle_pointer(PointerEvent::Wheel { delta_y });
                    }

                    WindowEvent::Touch(touch) => {
                        let logical = touch.location.to_logical::<f32>(window.scale_factor());
                        let id = PointerId::Touch(touch.id);
                        let event = match touch.phase {
                            TouchPhase::Started => PointerEvent::Down { id, x: logical.x, y: logical.y },
                            TouchPhase::Moved => PointerEvent::Move { id, x: logical.x, y: logical.y },
                            TouchPhase::Ended => PointerEvent::Up { id },
                            TouchPhase::Cancelled => PointerEvent::Cancel { id },
                        };
                        if let Some(target) = tour.handle_pointer(event).followed {
                            log::debug!("hotspot tap follows {target:?}");
                        }
                    }

                    WindowEvent::DroppedFile(path) => {
                        apply_action(UiAction::OpenFloorplan(path), &mut tour, &mut host, &window, control_flow);
                    }

                    _ => {}
                }
            }

            Event::RedrawRequested(_) => {
                if tour.needs_redraw() {
                    let frame = tour.render_scaled();
                    renderer.upload_frame(&frame.pixels);
                    host.hotspots = frame.hotspots;
                }

                let texture = renderer.frame_texture();
                let mut actions = Vec::new();
                let render_result = renderer.render_with_ui(&window, |ctx| {
                    draw_ui(ctx, &tour, &host, texture, &mut actions);
                });

                for action in actions {
                    apply_action(action, &mut tour, &mut host, &window, control_flow);
                }

                match render_result {
                    Ok(_) => {}
                    Err(wgpu::SurfaceError::Lost) => renderer.resize(renderer.size),
                    Err(wgpu::SurfaceError::OutOfMemory) => *control_flow = ControlFlow::Exit,
                    Err(e) => log::warn!("render error: {e:?}"),
                }
            }

            Event::MainEventsCleared => {
                window.request_redraw();
            }

            _ => {}
        }
    });
}

/// First argument that is neither a flag nor a flag's value.
fn positional_arg(args: &[String]) -> Option<PathBuf> {
    let mut it = args.iter().skip(1);
    while let Some(a) = it.next() {
        if a == "--images" || a == "--config" {
            it.next();
        } else if !a.starts_with("--") {
            return Some(PathBuf::from(a));
        }
    }
    None
}

fn demo_rooms() -> Vec<Room> {
    vec![
        Room::new("living", "Living room", Vec3::ZERO),
        Room::new("kitchen", "Kitchen", Vec3::new(0.0, 0.0, 6.0)),
        Room::new("bedroom", "Bedroom", Vec3::new(5.0, 0.0, 3.0)),
    ]
}

// 视口用逻辑像素，和 egui 的 point 一致
fn resize_tour(tour: &mut HostTour, window: &Window) {
    let logical = window.inner_size().to_logical::<f32>(window.scale_factor());
    tour.resize(logical.width.round() as u32, logical.height.round() as u32);
}

fn pick_floorplan() -> Option<PathBuf> {
    rfd::FileDialog::new()
        .add_filter("Floorplan", &["json"])
        .pick_file()
}

fn open_floorplan(path: &Path, tour: &mut HostTour, host: &mut HostState) {
    match load_rooms(path) {
        Ok(rooms) => {
            log::info!("loaded {} rooms from {}", rooms.len(), path.display());
            tour.set_rooms(rooms);
        }
        Err(e) => {
            log::error!("cannot read {}: {e}", path.display());
            host.last_error = Some(e.to_string());
        }
    }
}

fn apply_action(
    action: UiAction,
    tour: &mut HostTour,
    host: &mut HostState,
    window: &Window,
    control_flow: &mut ControlFlow,
) {
    match action {
        UiAction::OpenFloorplan(path) => open_floorplan(&path, tour, host),
        UiAction::OpenRoom(index) => {
            if let Err(e) = tour.navigate_to(index) {
                log::warn!("{e}");
            }
        }
        UiAction::Previous => {
            tour.previous();
        }
        UiAction::Next => {
            tour.next();
        }
        UiAction::Refresh => {
            if let Err(e) = tour.refresh() {
                log::debug!("nothing to refresh: {e}");
            }
        }
        UiAction::ResetView => tour.reset_view(),
        UiAction::ToggleFullscreen => {
            host.is_fullscreen = !host.is_fullscreen;
            if host.is_fullscreen {
                window.set_fullscreen(Some(Fullscreen::Borderless(None)));
            } else {
                window.set_fullscreen(None);
            }
        }
        UiAction::Exit => *control_flow = ControlFlow::Exit,
    }
}

fn draw_ui(
    ctx: &egui::Context,
    tour: &HostTour,
    host: &HostState,
    frame_texture: Option<egui::TextureId>,
    actions: &mut Vec<UiAction>,
) {
    // 全景帧和热点画在背景层，不拦截指针事件
    let painter = ctx.layer_painter(egui::LayerId::background());
    let screen = ctx.screen_rect();
    if let Some(texture) = frame_texture {
        painter.image(
            texture,
            screen,
            egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
            egui::Color32::WHITE,
        );
    }
    let radius = tour.config().hotspot_radius;
    for hotspot in &host.hotspots {
        let center = egui::pos2(hotspot.screen_x, hotspot.screen_y);
        painter.circle(
            center,
            radius,
            egui::Color32::from_rgba_unmultiplied(255, 255, 255, 90),
            egui::Stroke::new(2.0, egui::Color32::WHITE),
        );
        painter.text(
            center - egui::vec2(0.0, 30.0),
            egui::Align2::CENTER_CENTER,
            &hotspot.label,
            egui::FontId::proportional(14.0),
            egui::Color32::WHITE,
        );
    }

    egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
        egui::menu::bar(ui, |ui| {
            ui.menu_button("File", |ui| {
                if ui.button("Open floorplan…").clicked() {
                    ui.close_menu();
                    if let Some(path) = pick_floorplan() {
                        actions.push(UiAction::OpenFloorplan(path));
                    }
                }
                if ui.button("Exit").clicked() {
                    actions.push(UiAction::Exit);
                }
            });

            ui.menu_button("View", |ui| {
                if ui.button("Reset view").clicked() {
                    actions.push(UiAction::ResetView);
                    ui.close_menu();
                }
                if ui.button("Refresh room").clicked() {
                    actions.push(UiAction::Refresh);
                    ui.close_menu();
                }
                let label = if host.is_fullscreen { "Exit fullscreen" } else { "Fullscreen" };
                if ui.button(label).clicked() {
                    actions.push(UiAction::ToggleFullscreen);
                    ui.close_menu();
                }
            });

            ui.menu_button("Rooms", |ui| {
                let current = tour.navigation().state().current_index();
                for (i, room) in tour.navigation().state().rooms().iter().enumerate() {
                    if ui.selectable_label(i == current, &room.name).clicked() {
                        actions.push(UiAction::OpenRoom(i));
                        ui.close_menu();
                    }
                }
            });
        });
    });

    egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
        ui.horizontal(|ui| {
            let state = tour.navigation().state();
            let multiple = state.len() > 1;
            if ui.add_enabled(multiple, egui::Button::new("◀")).clicked() {
                actions.push(UiAction::Previous);
            }
            if ui.add_enabled(multiple, egui::Button::new("▶")).clicked() {
                actions.push(UiAction::Next);
            }

            match tour.current_room() {
                Some(room) => ui.label(format!(
                    "Room {} of {}: {}",
                    state.current_index() + 1,
                    state.len(),
                    room.name
                )),
                None => ui.label("No rooms"),
            };

            if tour.is_loading() {
                ui.label("|");
                ui.label(egui::RichText::new("Loading…").color(egui::Color32::YELLOW));
            }

            let camera = tour.camera();
            ui.label("|");
            ui.label(format!("FOV: {:.1}°", camera.fov()));
            ui.label("|");
            ui.label(format!("Equiv. focal: {:.1}mm", camera.equivalent_focal_length()));
            ui.label("|");
            ui.label(format!("Yaw: {:.1}°", camera.yaw().to_degrees()));
            ui.label("|");
            ui.label(format!("Pitch: {:.1}°", camera.pitch().to_degrees()));

            if let Some(error) = &host.last_error {
                ui.label("|");
                ui.label(egui::RichText::new(error).color(egui::Color32::LIGHT_RED));
            }
        });
    });
}

